use std::fmt::Write;
use std::hash::{ Hash, Hasher };

use crate::log::Loc;
use crate::module::Module;

use NodeKind::*;

/// Handle to an interned node. Handles are indices into the owning
/// module's arena; two structurally equal nodes built in the same module
/// always share one handle, so equality on handles is term equality.
/// Allocation order gives the deterministic total order used to keep
/// variable sets sorted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

/// Handle to an interned variable set (sorted, deduplicated).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VarSetId(pub(crate) u32);

/// Handle to an interned record-field or sum-variant name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl VarSetId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl LabelId {
    pub fn index(self) -> usize { self.0 as usize }
}

/// An integer or floating-point literal payload. Floats compare and hash
/// through their bit pattern so that interning stays total; the numeric
/// type of the literal lives in the node's type field, not here.
#[derive(Copy, Clone)]
pub enum Lit {
    Int(u64),
    Float(f64),
}

impl PartialEq for Lit {
    fn eq(&self, other : &Lit) -> bool {
        match (self, other) {
            (Lit::Int(a), Lit::Int(b)) => a == b,
            (Lit::Float(a), Lit::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false
        }
    }
}

impl Eq for Lit {}

impl Hash for Lit {
    fn hash<H : Hasher>(&self, state : &mut H) {
        match self {
            Lit::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            },
            Lit::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
        }
    }
}

impl std::fmt::Debug for Lit {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Lit::Int(v) => write!(f, "{}", v),
            Lit::Float(v) => write!(f, "{}", v)
        }
    }
}

/// The variant payload of a node. Aggregates carry parallel argument and
/// label arrays of equal length; labels within one node are unique.
/// `Undef` is the checker's "no expectation" sentinel and never appears
/// in well-typed output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Uni,
    Star,
    Nat,
    Int,
    Float,
    Undef,
    Err,
    Top,
    Bot,
    Lit(Lit),
    Var { label : Option<LabelId> },
    Sum { args : Box<[NodeId]>, labels : Box<[LabelId]> },
    Prod { args : Box<[NodeId]>, labels : Box<[LabelId]> },
    Record { args : Box<[NodeId]>, labels : Box<[LabelId]> },
    Ext { val : NodeId, label : LabelId },
    Ins { val : NodeId, label : LabelId, elem : NodeId },
    Inj { label : LabelId, arg : NodeId },
    Arrow { var : NodeId, codom : NodeId },
    Abs { var : NodeId, body : NodeId },
    App { left : NodeId, right : NodeId },
    Let { vars : Box<[NodeId]>, vals : Box<[NodeId]>, body : NodeId },
    Letrec { vars : Box<[NodeId]>, vals : Box<[NodeId]>, body : NodeId },
    Match { pats : Box<[NodeId]>, vals : Box<[NodeId]>, arg : NodeId },
}

/// A sealed, immutable IR node. The derived fields are computed once at
/// construction and capture facts about the whole subtree, so clients
/// never re-traverse to answer the common questions (which variables are
/// free, how deep is this term, does it contain an error).
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind : NodeKind,
    pub(crate) ty : NodeId,
    pub(crate) loc : Loc,
    pub(crate) depth : u32,
    pub(crate) free_vars : VarSetId,
    pub(crate) decl_vars : VarSetId,
    pub(crate) has_err : bool,
}

impl Node {
    pub fn kind(&self) -> &NodeKind { &self.kind }
    pub fn ty(&self) -> NodeId { self.ty }
    pub fn loc(&self) -> &Loc { &self.loc }
    pub fn depth(&self) -> u32 { self.depth }
    pub fn free_vars(&self) -> VarSetId { self.free_vars }
    pub fn decl_vars(&self) -> VarSetId { self.decl_vars }
    pub fn has_err(&self) -> bool { self.has_err }
}

/// Structural interning key : tag plus type handle plus variant payload.
/// Typed error nodes additionally key on their location so distinct
/// error sites keep distinct handles (`err_loc` is `None` for every
/// other tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub(crate) kind : NodeKind,
    pub(crate) ty : NodeId,
    pub(crate) err_loc : Option<Loc>,
}

impl Module {
    /// A pattern is a literal, a variable, a record of patterns, or an
    /// injection of a pattern.
    pub fn is_pat(&self, node : NodeId) -> bool {
        match self.kind(node) {
            NodeKind::Lit(_) | Var {..} => true,
            Record { args, .. } => args.iter().all(|a| self.is_pat(*a)),
            Inj { arg, .. } => self.is_pat(*arg),
            _ => false
        }
    }

    /// A trivial pattern matches every value of its type : a variable, or
    /// a record of trivial patterns.
    pub fn is_trivial_pat(&self, node : NodeId) -> bool {
        debug_assert!(self.is_pat(node), "is_trivial_pat called on a non-pattern");
        match self.kind(node) {
            Var {..} => true,
            Record { args, .. } => args.iter().all(|a| self.is_trivial_pat(*a)),
            _ => false
        }
    }

    /// An unbound variable is a parameter placeholder with no label; it
    /// stands for the formal of a non-dependent arrow or abstraction.
    pub fn is_unbound_var(&self, node : NodeId) -> bool {
        match self.kind(node) {
            Var { label : None } => true,
            _ => false
        }
    }

    pub fn is_undef(&self, node : NodeId) -> bool {
        match self.kind(node) {
            Undef => true,
            _ => false
        }
    }

    /// The distinguished failure sentinel whose type is itself.
    pub fn is_untyped_err(&self, node : NodeId) -> bool {
        match self.kind(node) {
            Err => self.ty(node) == node,
            _ => false
        }
    }

    /// True for `App(Int, w)` and `App(Float, w)`, the applied numeric
    /// kind constructors that literals may be typed at.
    pub fn is_int_or_float_app(&self, node : NodeId) -> bool {
        match self.kind(node) {
            App { left, .. } => match self.kind(*left) {
                Int | Float => true,
                _ => false
            },
            _ => false
        }
    }

    pub fn has_err(&self, node : NodeId) -> bool {
        self.node(node).has_err
    }

    /// Position of `label` in an aggregate's parallel label array.
    pub fn find_label_in(&self, node : NodeId, label : LabelId) -> Option<usize> {
        match self.kind(node) {
            Sum { labels, .. } | Prod { labels, .. } | Record { labels, .. } =>
                labels.iter().position(|l| *l == label),
            _ => None
        }
    }

    /// Compact rendering used by diagnostics and tests. The real printer
    /// lives with the host driver; this one only has to be unambiguous.
    pub fn show(&self, node : NodeId) -> String {
        let mut out = String::new();
        self.show_into(&mut out, node);
        out
    }

    fn show_var(&self, out : &mut String, var : NodeId) {
        match self.kind(var) {
            Var { label : Some(l) } => out.push_str(self.label_name(*l)),
            _ => out.push('_')
        }
    }

    fn show_fields(&self, out : &mut String, args : &[NodeId], labels : &[LabelId], sep : &str) {
        for (i, (arg, label)) in args.iter().zip(labels.iter()).enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(self.label_name(*label));
            out.push_str(sep);
            self.show_into(out, *arg);
        }
    }

    fn show_into(&self, out : &mut String, node : NodeId) {
        match self.kind(node).clone() {
            Uni => out.push_str("Uni"),
            Star => out.push('*'),
            Nat => out.push_str("Nat"),
            Int => out.push_str("Int"),
            Float => out.push_str("Float"),
            Undef => out.push('?'),
            Err => out.push_str("<err>"),
            Top => out.push_str("top"),
            Bot => out.push_str("bot"),
            NodeKind::Lit(lit) => { let _ = write!(out, "{:?}", lit); },
            Var {..} => self.show_var(out, node),
            Sum { args, labels } => {
                out.push('[');
                self.show_fields(out, &args, &labels, " : ");
                out.push(']');
            },
            Prod { args, labels } => {
                out.push('{');
                self.show_fields(out, &args, &labels, " : ");
                out.push('}');
            },
            Record { args, labels } => {
                out.push('{');
                self.show_fields(out, &args, &labels, " = ");
                out.push('}');
            },
            Ext { val, label } => {
                self.show_into(out, val);
                out.push('.');
                out.push_str(self.label_name(label));
            },
            Ins { val, label, elem } => {
                self.show_into(out, val);
                out.push_str(".{");
                out.push_str(self.label_name(label));
                out.push_str(" = ");
                self.show_into(out, elem);
                out.push('}');
            },
            Inj { label, arg } => {
                let _ = write!(out, "inj[{}](", self.label_name(label));
                self.show_into(out, arg);
                out.push(')');
            },
            Arrow { var, codom } => {
                if self.is_unbound_var(var) {
                    self.show_into(out, self.ty(var));
                } else {
                    out.push('(');
                    self.show_var(out, var);
                    out.push_str(" : ");
                    self.show_into(out, self.ty(var));
                    out.push(')');
                }
                out.push_str(" -> ");
                self.show_into(out, codom);
            },
            Abs { var, body } => {
                out.push('\u{3bb}');
                out.push(' ');
                self.show_var(out, var);
                out.push_str(" : ");
                self.show_into(out, self.ty(var));
                out.push_str(". ");
                self.show_into(out, body);
            },
            App { left, right } => {
                out.push('(');
                self.show_into(out, left);
                out.push(' ');
                self.show_into(out, right);
                out.push(')');
            },
            Let { vars, vals, body } | Letrec { vars, vals, body } => {
                out.push_str(match self.kind(node) {
                    Letrec {..} => "letrec ",
                    _ => "let "
                });
                for (i, (var, val)) in vars.iter().zip(vals.iter()).enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.show_var(out, *var);
                    out.push_str(" = ");
                    self.show_into(out, *val);
                }
                out.push_str(" in ");
                self.show_into(out, body);
            },
            Match { pats, vals, arg } => {
                out.push_str("match ");
                self.show_into(out, arg);
                out.push_str(" {");
                for (i, (pat, val)) in pats.iter().zip(vals.iter()).enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push(' ');
                    self.show_into(out, *pat);
                    out.push_str(" => ");
                    self.show_into(out, *val);
                }
                out.push_str(" }")
            }
        }
    }
}
