mod bytecode;
mod frontend;
mod runtime;

use std::{env, fs, path::Path, process};

use crate::bytecode::Op;
use crate::bytecode::compile;
use crate::bytecode::disasm::disassemble;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::Token;
use crate::runtime::Executor;

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let dis = args.contains(&"--dis".to_string());
    let emit = args.contains(&"--emit".to_string());

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    let Some(filename) = filename else {
        print_usage();
        if args.len() > 1 {
            process::exit(1);
        }
        return;
    };

    if extension(filename) == Some("cbc") {
        run_compiled_file(filename);
        return;
    }

    ensure_extension(filename);
    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if tokens_only {
        dump_tokens(&source);
    } else if dis {
        print!("{}", disassemble(&compile_or_exit(&source)));
    } else if emit {
        emit_compiled_file(&source, filename);
    } else {
        run_program(&source);
    }
}

fn print_usage() {
    println!("CINDER - a tiny imperative language on a stack machine");
    println!();
    println!("Usage:");
    println!("  cinder <file.cnd>           Compile and run a program");
    println!("  cinder --tokens <file.cnd>  Show the token stream");
    println!("  cinder --dis <file.cnd>     Show the compiled instructions");
    println!("  cinder --emit <file.cnd>    Write compiled bytecode to <file>.cbc");
    println!("  cinder <file.cbc>           Run precompiled bytecode");
}

fn extension(filename: &str) -> Option<&str> {
    Path::new(filename).extension().and_then(|e| e.to_str())
}

fn ensure_extension(filename: &str) {
    if extension(filename) != Some("cnd") {
        eprintln!("Error: expected a .cnd file, got {}", filename);
        process::exit(1);
    }
}

fn compile_or_exit(source: &str) -> Vec<Op> {
    match compile(source) {
        Ok(ops) => ops,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            process::exit(1);
        }
    }
}

fn dump_tokens(source: &str) {
    let mut lexer = Lexer::new(source);
    loop {
        let spanned = lexer.next_token();
        println!(
            "{}:{}\t{:?}",
            spanned.span.line, spanned.span.col, spanned.token
        );
        if spanned.token == Token::Eof {
            break;
        }
    }
}

fn run_program(source: &str) {
    let ops = compile_or_exit(source);
    if let Err(e) = Executor::new(ops).run() {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn emit_compiled_file(source: &str, filename: &str) {
    let ops = compile_or_exit(source);
    let bytes = match postcard::to_allocvec(&ops) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to encode bytecode: {}", e);
            process::exit(1);
        }
    };
    let out_path = Path::new(filename).with_extension("cbc");
    if let Err(e) = fs::write(&out_path, bytes) {
        eprintln!("Failed to write '{}': {}", out_path.display(), e);
        process::exit(1);
    }
    println!("wrote {}", out_path.display());
}

fn run_compiled_file(filename: &str) {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };
    let ops: Vec<Op> = match postcard::from_bytes(&bytes) {
        Ok(ops) => ops,
        Err(e) => {
            eprintln!("Failed to decode '{}': {}", filename, e);
            process::exit(1);
        }
    };
    if let Err(e) = Executor::new(ops).run() {
        eprintln!("{}", e);
        process::exit(1);
    }
}
