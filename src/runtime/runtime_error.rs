#[derive(Debug)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(msg: &str) -> Self {
        RuntimeError {
            message: msg.to_string(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("stack underflow")
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

pub fn pc_out_of_range(pc: usize) -> RuntimeError {
    RuntimeError::new(&format!("program counter out of range: {}", pc))
}

pub fn frame_out_of_range(level: usize, addr: i64) -> RuntimeError {
    RuntimeError::new(&format!(
        "frame access out of range: level {}, offset {}",
        level, addr
    ))
}

pub fn unknown_level(level: usize) -> RuntimeError {
    RuntimeError::new(&format!("no active frame at level {}", level))
}

pub fn corrupt_frame(base: usize) -> RuntimeError {
    RuntimeError::new(&format!("corrupt frame header at stack index {}", base))
}
