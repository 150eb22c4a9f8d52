#![forbid(unsafe_code)]

//! Core intermediate representation of a small dependently-typed
//! functional language : hash-consed expression graphs with interned
//! free-variable sets, algebraic simplification performed once at
//! construction, capture-free substitution over uniquely-named
//! variables, weak head reduction, and a bidirectional type checker
//! reporting through an external diagnostic log.
//!
//! All state hangs off a [`Module`] : it owns the node arena and the
//! three interning tables (nodes, labels, variable sets), so handles
//! are plain indices and equality of canonical terms is equality of
//! handles. A module is a single-threaded unit of ownership; dropping
//! it drops every node it ever built.

pub mod log;
pub mod node;
pub mod module;
pub mod subst;
pub mod simplify;
pub mod check;

pub use crate::check::check;
pub use crate::log::{ Diagnostic, Loc, Log, Pos, Severity };
pub use crate::module::{ Module, find_label };
pub use crate::node::{ LabelId, Lit, Node, NodeId, NodeKind, VarSetId };
