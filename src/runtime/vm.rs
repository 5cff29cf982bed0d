use crate::bytecode::op::Op;
use crate::runtime::runtime_error::{
    RuntimeError, corrupt_frame, division_by_zero, frame_out_of_range, pc_out_of_range,
    stack_underflow, unknown_level,
};
use std::collections::HashMap;
use std::io::{self, Write};

/// Bytecode executor.
///
/// One growable `Vec<i64>` plays operand stack, variable storage and
/// call-frame metadata at once. The display maps each lexical level to the
/// frame base (stack index of the first header cell) of the most recently
/// entered, still-active frame of that level; it is what lets a `(level,
/// addr)` pair fixed at compile time reach any enclosing frame regardless of
/// the dynamic call chain.
///
/// Execution halts normally when the program counter returns to 0, the
/// return address of the outermost frame.
pub struct Executor<W = io::Stdout> {
    code: Vec<Op>,
    pc: usize,
    stack: Vec<i64>,
    display: HashMap<usize, usize>,
    out: W,
}

impl Executor<io::Stdout> {
    pub fn new(code: Vec<Op>) -> Self {
        Self::with_output(code, io::stdout())
    }
}

impl<W: Write> Executor<W> {
    pub fn with_output(code: Vec<Op>, out: W) -> Self {
        Executor {
            code,
            pc: 0,
            stack: Vec::new(),
            display: HashMap::from([(0, 0)]),
            out,
        }
    }

    #[allow(dead_code)]
    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let Some(&op) = self.code.get(self.pc) else {
                return Err(pc_out_of_range(self.pc));
            };
            self.pc += 1;

            match op {
                Op::Lit(value) => self.stack.push(value),
                Op::Lod { level, addr } => {
                    let index = self.cell_index(level, addr)?;
                    self.stack.push(self.stack[index]);
                }
                Op::Sto { level, addr } => {
                    let value = self.pop()?;
                    let index = self.cell_index(level, addr)?;
                    self.stack[index] = value;
                }
                Op::Cal { level, addr } => {
                    // The callee's frame starts with its level's previous
                    // display value and the return address; arguments already
                    // sit below it, pushed by the caller.
                    let callee_level = level + 1;
                    let saved = self.display.get(&callee_level).copied().unwrap_or(0);
                    self.stack.push(saved as i64);
                    self.display.insert(callee_level, self.stack.len() - 1);
                    self.stack.push(self.pc as i64);
                    self.pc = addr;
                }
                Op::Ret { level, params } => {
                    let base = self.frame_base(level)?;
                    if base + 1 >= self.stack.len() {
                        return Err(corrupt_frame(base));
                    }
                    let saved = self.stack[base];
                    let return_pc = self.stack[base + 1];
                    if saved < 0 || return_pc < 0 {
                        return Err(corrupt_frame(base));
                    }
                    let result = self.pop()?;
                    self.display.insert(level, saved as usize);
                    self.pc = return_pc as usize;
                    // Drop the frame, then the caller-pushed arguments below
                    // it; the callee alone knows its arity.
                    self.stack.truncate(base);
                    for _ in 0..params {
                        self.pop()?;
                    }
                    self.stack.push(result);
                }
                Op::Ict(n) => {
                    for _ in 0..n {
                        self.stack.push(0);
                    }
                }
                Op::Jmp(target) => self.pc = target,
                Op::Jpc(target) => {
                    if self.pop()? == 0 {
                        self.pc = target;
                    }
                }
                Op::Neg => {
                    let a = self.pop()?;
                    self.stack.push(-a);
                }
                Op::Add => {
                    let (a, b) = self.pop2()?;
                    self.stack.push(a + b);
                }
                Op::Sub => {
                    let (a, b) = self.pop2()?;
                    self.stack.push(a - b);
                }
                Op::Mul => {
                    let (a, b) = self.pop2()?;
                    self.stack.push(a * b);
                }
                Op::Div => {
                    let (a, b) = self.pop2()?;
                    if b == 0 {
                        return Err(division_by_zero());
                    }
                    // i64 division truncates toward zero.
                    self.stack.push(a / b);
                }
                Op::Odd => {
                    let a = self.pop()?;
                    self.stack.push(a & 1);
                }
                Op::Eq => {
                    let (a, b) = self.pop2()?;
                    self.stack.push((a == b) as i64);
                }
                Op::NotEq => {
                    let (a, b) = self.pop2()?;
                    self.stack.push((a != b) as i64);
                }
                Op::Lss => {
                    let (a, b) = self.pop2()?;
                    self.stack.push((a < b) as i64);
                }
                Op::Grt => {
                    let (a, b) = self.pop2()?;
                    self.stack.push((a > b) as i64);
                }
                Op::LssEq => {
                    let (a, b) = self.pop2()?;
                    self.stack.push((a <= b) as i64);
                }
                Op::GrtEq => {
                    let (a, b) = self.pop2()?;
                    self.stack.push((a >= b) as i64);
                }
                Op::Wrt => {
                    let value = self.pop()?;
                    write!(self.out, "{}", value)
                        .map_err(|e| RuntimeError::new(&format!("write error: {}", e)))?;
                }
                Op::Wrl => {
                    writeln!(self.out)
                        .map_err(|e| RuntimeError::new(&format!("write error: {}", e)))?;
                }
            }

            if self.pc == 0 {
                return Ok(());
            }
        }
    }

    fn pop(&mut self) -> Result<i64, RuntimeError> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    /// Pops `b` then `a`; `a` is the language-level left operand.
    fn pop2(&mut self) -> Result<(i64, i64), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn frame_base(&self, level: usize) -> Result<usize, RuntimeError> {
        self.display
            .get(&level)
            .copied()
            .ok_or_else(|| unknown_level(level))
    }

    fn cell_index(&self, level: usize, addr: i64) -> Result<usize, RuntimeError> {
        let base = self.frame_base(level)?;
        let index = base as i64 + addr;
        if index < 0 || index as usize >= self.stack.len() {
            return Err(frame_out_of_range(level, addr));
        }
        Ok(index as usize)
    }
}
