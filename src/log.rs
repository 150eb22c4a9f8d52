use std::rc::Rc;

/// A position in a source file. Rows and columns both start at 1;
/// a zeroed position means "unknown".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Pos {
    pub row : u32,
    pub col : u32,
}

impl Pos {
    pub fn mk(row : u32, col : u32) -> Self {
        Pos { row, col }
    }
}

/// A source range attached to IR nodes for diagnostics. Locations never
/// participate in node identity, with the sole exception of typed error
/// nodes, which are kept distinct per error site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Loc {
    pub file : Option<Rc<str>>,
    pub begin : Pos,
    pub end : Pos,
}

impl Loc {
    pub fn mk(file : &str, begin : Pos, end : Pos) -> Self {
        Loc {
            file : Some(Rc::from(file)),
            begin,
            end
        }
    }

    pub fn is_known(&self) -> bool {
        self.file.is_some()
    }
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.begin.row, self.begin.col),
            None => write!(f, "<unknown>")
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
    Note,
}

/// One recorded message. The core never renders these; the host driver
/// decides what (if anything) to do with them.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity : Severity,
    pub loc : Loc,
    pub message : String,
}

/// Sink for checker diagnostics. Counts errors and warnings separately
/// so a driver can pick its exit code without scanning the list.
#[derive(Debug, Default)]
pub struct Log {
    pub diagnostics : Vec<Diagnostic>,
    pub errors : usize,
    pub warns : usize,
}

impl Log {
    pub fn new() -> Self {
        Log::default()
    }

    pub fn error(&mut self, loc : &Loc, message : impl Into<String>) {
        self.errors += 1;
        self.push(Severity::Error, loc, message.into());
    }

    pub fn warn(&mut self, loc : &Loc, message : impl Into<String>) {
        self.warns += 1;
        self.push(Severity::Warn, loc, message.into());
    }

    pub fn note(&mut self, loc : &Loc, message : impl Into<String>) {
        self.push(Severity::Note, loc, message.into());
    }

    fn push(&mut self, severity : Severity, loc : &Loc, message : String) {
        self.diagnostics.push(Diagnostic {
            severity,
            loc : loc.clone(),
            message
        });
    }
}

#[cfg(test)]
mod log_tests {
    use super::*;

    #[test]
    fn counters_track_severities() {
        let mut log = Log::new();
        let loc = Loc::mk("demo.ln", Pos::mk(1, 1), Pos::mk(1, 4));
        log.error(&loc, "first");
        log.warn(&loc, "second");
        log.note(&loc, "third");
        log.error(&Loc::default(), "fourth");
        assert_eq!(log.errors, 2);
        assert_eq!(log.warns, 1);
        assert_eq!(log.diagnostics.len(), 4);
        assert_eq!(format!("{}", loc), "demo.ln:1:1");
        assert_eq!(format!("{}", Loc::default()), "<unknown>");
    }
}
