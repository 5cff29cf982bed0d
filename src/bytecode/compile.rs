use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::Op;
use crate::bytecode::symbols::{Entry, FRAME_HEADER, SymbolTable};
use crate::frontend::lexer::{Lexer, Span, Spanned};
use crate::frontend::token::Token;

/// Code-generating recursive-descent parser.
///
/// ```text
/// program    := statement-list
/// statement  := ident '=' expression
///             | 'if' '(' condition ')' '{' statement '}'
///             | 'while' '(' condition ')' 'do' '{' statement-list '}'
///             | 'return' expression
///             | 'write' expression
///             | 'writeln'
///             | const-decl | var-decl | func-decl
/// const-decl := 'const' ident '=' int {',' ident '=' int}
/// var-decl   := 'var' ident {',' ident}
/// func-decl  := 'function' ident '(' [ident {',' ident}] ')' '{' statement-list '}'
/// condition  := expression ('=='|'!='|'<'|'>'|'<='|'>=') expression
/// expression := ['+'|'-'] term {('+'|'-') term}
/// term       := factor {('*'|'/') factor}
/// factor     := ident | int | ident '(' [expression {',' expression}] ')'
///             | '(' expression ')'
/// ```
///
/// There is no AST: each rule emits instructions as it recognizes input,
/// driven by one token of lookahead. The first error aborts the whole
/// compile; no instructions are returned.
pub struct Compiler {
    lexer: Lexer,
    current: Spanned,
    code: Vec<Op>,
    table: SymbolTable,
    /// Table indices of the enclosing `Func` entries, innermost last.
    funcs: Vec<usize>,
}

/// Compiles source text to a flat instruction sequence.
pub fn compile(source: &str) -> Result<Vec<Op>, CompileError> {
    Compiler::new(Lexer::new(source)).compile()
}

impl Compiler {
    pub fn new(mut lexer: Lexer) -> Self {
        let current = lexer.next_token();
        Compiler {
            lexer,
            current,
            code: Vec::new(),
            table: SymbolTable::new(),
            funcs: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<Vec<Op>, CompileError> {
        // Reserve the outermost frame's header cells so the closing RET can
        // read a saved display value and a zero return address.
        self.emit(Op::Ict(FRAME_HEADER as usize));
        self.statement_list()?;
        if self.current.token != Token::Eof {
            return Err(CompileError::unexpected(
                "a statement or end of input",
                &self.current,
            ));
        }
        self.emit(Op::Ret { level: 0, params: 0 });
        Ok(self.code)
    }

    // Token plumbing

    fn advance(&mut self) -> Spanned {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), CompileError> {
        if self.current.token == token {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::unexpected(what, &self.current))
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned, CompileError> {
        if matches!(self.current.token, Token::Ident(_)) {
            Ok(self.advance())
        } else {
            Err(CompileError::unexpected("an identifier", &self.current))
        }
    }

    fn expect_int(&mut self) -> Result<i64, CompileError> {
        if let Token::Int(value) = self.current.token {
            self.advance();
            Ok(value)
        } else {
            Err(CompileError::unexpected("an integer", &self.current))
        }
    }

    // Code emission

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        match &mut self.code[at] {
            Op::Jmp(t) | Op::Jpc(t) => *t = target,
            other => unreachable!("patched instruction {} is not a jump", other),
        }
    }

    /// Appends an entry and reserves one stack cell for it, so declaration
    /// order in source matches slot order in the frame.
    fn declare(&mut self, entry: Entry) -> usize {
        let index = self.table.define(entry);
        self.emit(Op::Ict(1));
        index
    }

    // Grammar rules

    fn statement_list(&mut self) -> Result<(), CompileError> {
        while self.current.token.starts_statement() || self.current.token == Token::Semicolon {
            self.statement()?;
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<(), CompileError> {
        match self.current.token {
            Token::Ident(_) => self.assignment(),
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::Return => self.return_statement(),
            Token::Write => {
                self.advance();
                self.expression()?;
                self.emit(Op::Wrt);
                Ok(())
            }
            Token::Writeln => {
                self.advance();
                self.emit(Op::Wrl);
                Ok(())
            }
            Token::Const => self.const_decl(),
            Token::Var => self.var_decl(),
            Token::Function => self.func_decl(),
            // Empty statement; lets `;` separate statements.
            Token::Semicolon => {
                self.advance();
                Ok(())
            }
            _ => Err(CompileError::unexpected("a statement", &self.current)),
        }
    }

    fn assignment(&mut self) -> Result<(), CompileError> {
        let ident = self.expect_ident()?;
        let name = ident.token.to_string();
        match self.table.resolve(&name) {
            Some(Entry::Var { level, addr, .. }) | Some(Entry::Par { level, addr, .. }) => {
                self.expect(Token::Assign, "'='")?;
                self.expression()?;
                self.emit(Op::Sto { level, addr });
                Ok(())
            }
            Some(_) => Err(CompileError::not_assignable(name, ident.span)),
            None => Err(CompileError::undeclared(name, ident.span)),
        }
    }

    fn if_statement(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.expect(Token::LParen, "'('")?;
        self.condition()?;
        self.expect(Token::RParen, "')'")?;
        self.expect(Token::LBrace, "'{'")?;
        let jpc = self.emit(Op::Jpc(0));
        self.statement()?;
        let after = self.code.len();
        self.patch_jump(jpc, after);
        self.expect(Token::RBrace, "'}'")
    }

    fn while_statement(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.expect(Token::LParen, "'('")?;
        let condition_start = self.code.len();
        self.condition()?;
        self.expect(Token::RParen, "')'")?;
        let jpc = self.emit(Op::Jpc(0));
        self.expect(Token::Do, "'do'")?;
        self.expect(Token::LBrace, "'{'")?;
        self.statement_list()?;
        self.emit(Op::Jmp(condition_start));
        let after = self.code.len();
        self.patch_jump(jpc, after);
        self.expect(Token::RBrace, "'}'")
    }

    fn return_statement(&mut self) -> Result<(), CompileError> {
        let keyword = self.advance();
        self.expression()?;
        let Some(&func_index) = self.funcs.last() else {
            return Err(CompileError::return_outside_function(keyword.span));
        };
        let params = match self.table.entry_mut(func_index) {
            Entry::Func { params, .. } => *params,
            other => unreachable!("return context entry {:?} is not a function", other),
        };
        self.emit(Op::Ret {
            level: self.table.level(),
            params,
        });
        Ok(())
    }

    fn const_decl(&mut self) -> Result<(), CompileError> {
        self.advance();
        loop {
            let ident = self.expect_ident()?;
            self.expect(Token::Assign, "'='")?;
            let value = self.expect_int()?;
            self.declare(Entry::Const {
                name: ident.token.to_string(),
                value,
            });
            if self.current.token != Token::Comma {
                break;
            }
            self.advance();
        }
        Ok(())
    }

    fn var_decl(&mut self) -> Result<(), CompileError> {
        self.advance();
        loop {
            let ident = self.expect_ident()?;
            let addr = self.table.alloc_local();
            self.declare(Entry::Var {
                name: ident.token.to_string(),
                level: self.table.level(),
                addr,
            });
            if self.current.token != Token::Comma {
                break;
            }
            self.advance();
        }
        Ok(())
    }

    /// Declares the `Func` entry (with its entry address fixed to two
    /// instructions past the current position) *before* compiling the body,
    /// so the body can call itself. A skip-jump keeps the enclosing block
    /// from running into the body; it is patched once the body ends.
    fn func_decl(&mut self) -> Result<(), CompileError> {
        self.advance();
        let ident = self.expect_ident()?;
        let entry = self.code.len() + 2;
        let func_index = self.declare(Entry::Func {
            name: ident.token.to_string(),
            level: self.table.level(),
            entry,
            params: 0,
        });
        let skip = self.emit(Op::Jmp(0));

        self.expect(Token::LParen, "'('")?;
        self.table.enter_scope();
        self.funcs.push(func_index);

        let first_param = self.table.len();
        let mut params = 0;
        if matches!(self.current.token, Token::Ident(_)) {
            loop {
                let param = self.expect_ident()?;
                self.declare(Entry::Par {
                    name: param.token.to_string(),
                    level: self.table.level(),
                    addr: 0,
                });
                params += 1;
                if self.current.token != Token::Comma {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Token::RParen, "')'")?;

        // The last parameter sits immediately below the frame header.
        for i in 0..params {
            if let Entry::Par { addr, .. } = self.table.entry_mut(first_param + i) {
                *addr = i as i64 - params as i64;
            }
        }
        if let Entry::Func { params: p, .. } = self.table.entry_mut(func_index) {
            *p = params;
        }

        self.expect(Token::LBrace, "'{'")?;
        self.statement_list()?;
        if !matches!(self.code.last(), Some(Op::Ret { .. })) {
            self.emit(Op::Ret {
                level: self.table.level(),
                params,
            });
        }

        self.funcs.pop();
        self.table.exit_scope();
        let after = self.code.len();
        self.patch_jump(skip, after);
        self.expect(Token::RBrace, "'}'")
    }

    fn condition(&mut self) -> Result<(), CompileError> {
        self.expression()?;
        let op = match self.current.token {
            Token::Eq => Op::Eq,
            Token::NotEq => Op::NotEq,
            Token::Lss => Op::Lss,
            Token::LssEq => Op::LssEq,
            Token::Grt => Op::Grt,
            Token::GrtEq => Op::GrtEq,
            _ => {
                return Err(CompileError::unexpected(
                    "a comparison operator",
                    &self.current,
                ));
            }
        };
        self.advance();
        self.expression()?;
        self.emit(op);
        Ok(())
    }

    fn expression(&mut self) -> Result<(), CompileError> {
        match self.current.token {
            Token::Plus => {
                self.advance();
                self.term()?;
            }
            Token::Minus => {
                self.advance();
                self.term()?;
                self.emit(Op::Neg);
            }
            _ => self.term()?,
        }
        while matches!(self.current.token, Token::Plus | Token::Minus) {
            let subtract = self.current.token == Token::Minus;
            self.advance();
            self.term()?;
            self.emit(if subtract { Op::Sub } else { Op::Add });
        }
        Ok(())
    }

    fn term(&mut self) -> Result<(), CompileError> {
        self.factor()?;
        while matches!(self.current.token, Token::Star | Token::Slash) {
            let divide = self.current.token == Token::Slash;
            self.advance();
            self.factor()?;
            self.emit(if divide { Op::Div } else { Op::Mul });
        }
        Ok(())
    }

    fn factor(&mut self) -> Result<(), CompileError> {
        match self.current.token {
            Token::Ident(_) => {
                let ident = self.expect_ident()?;
                let name = ident.token.to_string();
                match self.table.resolve(&name) {
                    Some(Entry::Const { value, .. }) => {
                        self.emit(Op::Lit(value));
                        Ok(())
                    }
                    Some(Entry::Var { level, addr, .. }) | Some(Entry::Par { level, addr, .. }) => {
                        self.emit(Op::Lod { level, addr });
                        Ok(())
                    }
                    Some(Entry::Func {
                        level,
                        entry,
                        params,
                        ..
                    }) => self.call(name, ident.span, level, entry, params),
                    None => Err(CompileError::undeclared(name, ident.span)),
                }
            }
            Token::Int(value) => {
                self.advance();
                self.emit(Op::Lit(value));
                Ok(())
            }
            Token::LParen => {
                self.advance();
                self.expression()?;
                self.expect(Token::RParen, "')'")
            }
            _ => Err(CompileError::unexpected("an expression", &self.current)),
        }
    }

    fn call(
        &mut self,
        name: String,
        span: Span,
        level: usize,
        entry: usize,
        params: usize,
    ) -> Result<(), CompileError> {
        self.expect(Token::LParen, "'('")?;
        let mut args = 0;
        if self.current.token != Token::RParen {
            loop {
                self.expression()?;
                args += 1;
                if self.current.token != Token::Comma {
                    break;
                }
                self.advance();
            }
        }
        if args != params {
            return Err(CompileError::arity_mismatch(name, params, args, span));
        }
        self.expect(Token::RParen, "')'")?;
        self.emit(Op::Cal { level, addr: entry });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> Vec<Op> {
        compile(source).expect("program should compile")
    }

    fn compile_err(source: &str) -> CompileError {
        match compile(source) {
            Ok(ops) => panic!("expected a compile error, got {:?}", ops),
            Err(e) => e,
        }
    }

    #[test]
    fn test_write_expression_codegen() {
        let ops = compile_ok("write 1+2*3; writeln");
        assert_eq!(ops, vec![
            Op::Ict(2),
            Op::Lit(1),
            Op::Lit(2),
            Op::Lit(3),
            Op::Mul,
            Op::Add,
            Op::Wrt,
            Op::Wrl,
            Op::Ret { level: 0, params: 0 },
        ]);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let source = "
            function fib(n) {
                if (n == 0) { return 0 }
                if (n == 1) { return 1 }
                return fib(n - 1) + fib(n - 2)
            }
            var i
            i = 0
            while (i < 10) do {
                write fib(i)
                writeln
                i = i + 1
            }
        ";
        assert_eq!(compile_ok(source), compile_ok(source));
    }

    #[test]
    fn test_const_is_inlined_at_use() {
        let ops = compile_ok("const a = 3 write a");
        assert_eq!(ops, vec![
            Op::Ict(2),
            Op::Ict(1),
            Op::Lit(3),
            Op::Wrt,
            Op::Ret { level: 0, params: 0 },
        ]);
    }

    #[test]
    fn test_var_assignment_codegen() {
        let ops = compile_ok("var x x = 5 write x");
        assert_eq!(ops, vec![
            Op::Ict(2),
            Op::Ict(1),
            Op::Lit(5),
            Op::Sto { level: 0, addr: 2 },
            Op::Lod { level: 0, addr: 2 },
            Op::Wrt,
            Op::Ret { level: 0, params: 0 },
        ]);
    }

    #[test]
    fn test_vars_get_consecutive_frame_slots() {
        let ops = compile_ok("var a, b a = 1 b = 2");
        assert!(ops.contains(&Op::Sto { level: 0, addr: 2 }));
        assert!(ops.contains(&Op::Sto { level: 0, addr: 3 }));
    }

    #[test]
    fn test_unary_minus_emits_neg() {
        let ops = compile_ok("write -3");
        assert_eq!(&ops[1..3], &[Op::Lit(3), Op::Neg]);
    }

    #[test]
    fn test_function_entry_is_two_past_declaration() {
        let ops = compile_ok("function f() { return 1 } write f()");
        // prologue(0), declaration cell(1), skip jump(2), body(3..)
        assert_eq!(ops[2], Op::Jmp(5));
        assert_eq!(ops[3], Op::Lit(1));
        assert_eq!(ops[4], Op::Ret { level: 1, params: 0 });
        assert_eq!(ops[5], Op::Cal { level: 0, addr: 3 });
    }

    #[test]
    fn test_parameters_have_negative_addresses() {
        let ops = compile_ok("function f(a, b) { return a }");
        // Last parameter sits immediately below the frame header.
        assert!(ops.contains(&Op::Lod { level: 1, addr: -2 }));
        assert!(ops.contains(&Op::Ret { level: 1, params: 2 }));
    }

    #[test]
    fn test_implicit_return_appended_to_function_body() {
        let ops = compile_ok("function f(a) { write a }");
        assert!(ops.contains(&Op::Ret { level: 1, params: 1 }));
    }

    #[test]
    fn test_while_backpatches_both_jumps() {
        let ops = compile_ok("var i i = 0 while (i < 3) do { i = i + 1 }");
        assert_eq!(ops[7], Op::Jpc(13));
        assert_eq!(ops[12], Op::Jmp(4));
    }

    #[test]
    fn test_if_jumps_past_body() {
        let ops = compile_ok("var x x = 0 if (x == 0) { x = 1 }");
        // condition(4..7): LOD LIT EQ, then JPC over the body's LIT/STO.
        assert_eq!(ops[7], Op::Jpc(10));
        assert_eq!(ops[8], Op::Lit(1));
        assert_eq!(ops[9], Op::Sto { level: 0, addr: 2 });
    }

    #[test]
    fn test_recursive_call_resolves_own_entry() {
        let ops = compile_ok("function loop(n) { return loop(n - 1) }");
        // Entry = declaration cell index + 2.
        assert!(ops.contains(&Op::Cal { level: 0, addr: 3 }));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = compile_err("function f(a, b) { return a } write f(1)");
        match err {
            CompileError::ArityMismatch {
                name,
                expected,
                found,
                ..
            } => {
                assert_eq!(name, "f");
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected ArityMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_identifier() {
        let err = compile_err("write x");
        assert!(matches!(err, CompileError::UndeclaredIdentifier { .. }));
    }

    #[test]
    fn test_inner_declaration_is_dropped_at_block_exit() {
        let err = compile_err("function f() { var inner inner = 1 return inner } write inner");
        match err {
            CompileError::UndeclaredIdentifier { name, .. } => assert_eq!(name, "inner"),
            other => panic!("expected UndeclaredIdentifier, got {:?}", other),
        }
    }

    #[test]
    fn test_shadowing_by_recency() {
        let ops = compile_ok("var x function f() { var x x = 2 return x } x = 5 write x");
        // Inner x resolves to the level-1 slot, outer x to the level-0 slot.
        assert!(ops.contains(&Op::Sto { level: 1, addr: 2 }));
        assert!(ops.contains(&Op::Sto { level: 0, addr: 2 }));
    }

    #[test]
    fn test_return_outside_function() {
        let err = compile_err("return 1");
        assert!(matches!(err, CompileError::ReturnOutsideFunction { .. }));
    }

    #[test]
    fn test_assignment_to_const_rejected() {
        let err = compile_err("const a = 1 a = 2");
        assert!(matches!(err, CompileError::NotAssignable { .. }));
    }

    #[test]
    fn test_assignment_to_function_rejected() {
        let err = compile_err("function f() { return 1 } f = 2");
        assert!(matches!(err, CompileError::NotAssignable { .. }));
    }

    #[test]
    fn test_missing_comparison_operator() {
        let err = compile_err("var x if (x) { x = 1 }");
        match err {
            CompileError::UnexpectedToken { expected, .. } => {
                assert!(expected.contains("comparison"));
            }
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn test_illegal_token_surfaces_as_unexpected() {
        let err = compile_err("write @");
        match err {
            CompileError::UnexpectedToken { found, .. } => {
                assert_eq!(found, Token::Illegal("@".to_string()));
            }
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let err = compile_err("write 1 }");
        assert!(matches!(err, CompileError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_error_spans_point_at_the_offender() {
        let err = compile_err("var x\nwrite y");
        match err {
            CompileError::UndeclaredIdentifier { name, span } => {
                assert_eq!(name, "y");
                assert_eq!(span.line, 2);
                assert_eq!(span.col, 7);
            }
            other => panic!("expected UndeclaredIdentifier, got {:?}", other),
        }
    }
}
