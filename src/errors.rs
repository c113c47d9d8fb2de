// File: src/errors.rs
//
// Error handling and reporting for the Probotics execution core.
// Provides a structured error type with source location information,
// matching the taxonomy laid out for the compiler and interpreter.

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where code appears in a script
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error taxonomy from the execution core's design: compile-time failures,
/// structural interpreter bugs, and native-callable failures. `Breakpoint` is
/// deliberately absent here -- it is a control signal, not a user-facing error,
/// and is modeled separately in `interpreter::signal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed source; never crosses the scheduler boundary.
    CompileError,
    /// Unsupported operation between value variants.
    TypeError,
    /// Lookup failed where the caller requires a bound name (distinct from the
    /// permissive `GetValue`, which returns `Null` instead of raising this).
    UndefinedSymbol,
    /// The value stack did not have the operands an instruction expected.
    StackUnderflow,
    /// A jump or catch offset resolved outside the operations list.
    BadJump,
    /// A native callable failed.
    NativeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::CompileError => write!(f, "Compile Error"),
            ErrorKind::TypeError => write!(f, "Type Error"),
            ErrorKind::UndefinedSymbol => write!(f, "Undefined Symbol"),
            ErrorKind::StackUnderflow => write!(f, "Stack Underflow"),
            ErrorKind::BadJump => write!(f, "Bad Jump"),
            ErrorKind::NativeError => write!(f, "Native Error"),
        }
    }
}

/// A structured error with location information, carried from compile time or
/// raised during execution and surfaced to a host via `on_exception`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProboticsError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
}

impl ProboticsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self { kind, message: message.into(), location }
    }

    pub fn compile(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::new(ErrorKind::CompileError, message, location)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message, SourceLocation::unknown())
    }

    pub fn undefined_symbol(name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedSymbol,
            format!("No value for '{name}'"),
            SourceLocation::unknown(),
        )
    }

    pub fn stack_underflow() -> Self {
        Self::new(ErrorKind::StackUnderflow, "value stack is empty", SourceLocation::unknown())
    }

    pub fn bad_jump(offset: isize, len: usize) -> Self {
        Self::new(
            ErrorKind::BadJump,
            format!("jump offset {offset} is out of bounds for {len} instructions"),
            SourceLocation::unknown(),
        )
    }

    pub fn native(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NativeError, message, SourceLocation::unknown())
    }
}

impl fmt::Display for ProboticsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = format!("{}", self.kind);
        writeln!(f, "{}: {}", kind_str.red().bold(), self.message.bold())?;
        if self.location != SourceLocation::unknown() {
            writeln!(f, "{}", format!("  --> {}", self.location).bright_blue())?;
        }
        Ok(())
    }
}

impl std::error::Error for ProboticsError {}
