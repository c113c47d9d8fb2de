// File: src/interpreter/signal.rs
//
// Control-flow signals threaded out of the inner execution loop. Rather than
// language-level exceptions, enter-scope, exit-scope, and breakpoints are
// encoded as a tagged result the driving loop matches on and uses to
// manipulate the frame chain -- never as a `std::error::Error`.

use crate::interpreter::frame::StackFrame;
use crate::interpreter::value::Value;

/// One of the three control signals a frame's inner loop can unwind with.
pub enum Signal {
    /// A `Call` bound its arguments and wants the driving loop to switch to
    /// the freshly built child frame.
    EnterScope(Box<StackFrame>),
    /// The current frame ran off the end of its operations (or was asked to
    /// unwind normally); `return_value` is `Some` only when the frame's
    /// value stack held exactly one value at exit.
    ExitScope { return_value: Option<Value> },
    /// `break`/`next`/`return`, or a native's cooperative suspension.
    Breakpoint(Breakpoint),
}

/// `reason` is one of `"break"`, `"next"`, `"return"`, or a native-chosen
/// string (e.g. `"wait"`). `stop=true` parks the whole context rather than
/// unwinding to a `Catch`.
pub struct Breakpoint {
    pub reason: String,
    pub stop: bool,
    pub value: Option<Value>,
}

impl Breakpoint {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), stop: false, value: None }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn stopping(mut self) -> Self {
        self.stop = true;
        self
    }
}
