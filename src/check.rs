use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::log::{ Loc, Log };
use crate::module::{ Module, find_label };
use crate::node::{ LabelId, Lit, NodeId, NodeKind };

use NodeKind::*;

type Scope = IndexMap<LabelId, NodeId, FxBuildHasher>;

/// Lexical stack of label-to-variable scopes with a cursor. Scopes are
/// recycled rather than reallocated : `push` clears the next slot and
/// enters it, `reenter` enters it keeping its contents, so peer scopes
/// (match arms) share one slot, and `insert_ahead` deposits a variable
/// into the next slot while the checker still stands outside it.
struct Env {
    scopes : Vec<Scope>,
    top : usize,
}

impl Env {
    fn new() -> Self {
        Env {
            scopes : vec![Scope::default()],
            top : 0,
        }
    }

    fn ensure(&mut self, index : usize) {
        while self.scopes.len() <= index {
            self.scopes.push(Scope::default());
        }
    }

    fn push(&mut self) {
        self.top += 1;
        self.ensure(self.top);
        self.scopes[self.top].clear();
    }

    fn reenter(&mut self) {
        self.top += 1;
        self.ensure(self.top);
    }

    fn pop(&mut self) {
        self.top -= 1;
    }

    fn insert(&mut self, label : LabelId, var : NodeId) {
        self.scopes[self.top].insert(label, var);
    }

    fn insert_ahead(&mut self, label : LabelId, var : NodeId) {
        let next = self.top + 1;
        self.ensure(next);
        self.scopes[next].insert(label, var);
    }

    fn lookup(&self, label : LabelId) -> Option<NodeId> {
        for scope in self.scopes[..=self.top].iter().rev() {
            if let Some(&var) = scope.get(&label) {
                return Some(var)
            }
        }
        None
    }
}

/// The failure kinds the checker can diagnose. Each one renders to a
/// single diagnostic through the log; cascade suppression happens at
/// the call sites via the cached error bit. Constructors never emit
/// these, since precondition violations there are programmer bugs.
#[derive(Debug)]
enum TypeError {
    TypeMismatch { expected : NodeId, got : NodeId },
    InvalidType { ty : NodeId, what : String },
    NonFunctionCallee { ty : NodeId },
    UnknownIdentifier { label : LabelId },
    InvalidPattern,
    InvalidNodeInContext { what : String },
}

struct Checker<'a> {
    m : &'a mut Module,
    log : &'a mut Log,
    env : Env,
}

/// Check `node`, inferring its type, and return a well-typed canonical
/// node or an error node. Diagnostics go to `log`; the checker itself
/// never panics on bad input, and an error in a subterm suppresses
/// further diagnosis of everything derived from it.
pub fn check(module : &mut Module, log : &mut Log, node : NodeId) -> NodeId {
    let mut checker = Checker {
        m : module,
        log,
        env : Env::new(),
    };
    checker.infer(node)
}

impl<'a> Checker<'a> {
    fn infer(&mut self, node : NodeId) -> NodeId {
        let undef = self.m.mk_undef();
        self.check_node(node, undef)
    }

    /// The error node for a failed check : typed by the prototype when
    /// one was available, the untyped sentinel otherwise.
    fn err_node(&mut self, proto : NodeId, loc : &Loc) -> NodeId {
        if self.m.is_undef(proto) || self.m.has_err(proto) {
            self.m.mk_untyped_err(loc.clone())
        } else {
            self.m.mk_err(proto, loc.clone())
        }
    }

    /// Render one error kind into the log.
    fn report(&mut self, error : TypeError, loc : &Loc) {
        let message = match error {
            TypeError::TypeMismatch { expected, got } => format!(
                "expected type '{}', but got '{}'",
                self.m.show(expected), self.m.show(got)),
            TypeError::InvalidType { ty, what } => format!(
                "invalid type '{}' for {}", self.m.show(ty), what),
            TypeError::NonFunctionCallee { ty } => format!(
                "invalid type '{}' for application callee", self.m.show(ty)),
            TypeError::UnknownIdentifier { label } => format!(
                "unknown identifier '{}'", self.m.label_name(label)),
            TypeError::InvalidPattern => "invalid pattern".to_string(),
            TypeError::InvalidNodeInContext { what } => what,
        };
        self.log.error(loc, message);
    }

    fn type_mismatch(&mut self, expected : NodeId, got : NodeId, loc : &Loc) -> NodeId {
        if !self.m.has_err(expected) && !self.m.has_err(got) {
            self.report(TypeError::TypeMismatch { expected, got }, loc);
        }
        self.m.mk_untyped_err(loc.clone())
    }

    fn invalid_type(&mut self, ty : NodeId, what : &str, loc : &Loc) {
        if !self.m.has_err(ty) {
            self.report(TypeError::InvalidType { ty, what : what.to_string() }, loc);
        }
    }

    fn invalid_in_context(&mut self, what : &str, proto : NodeId, loc : &Loc) -> NodeId {
        self.report(TypeError::InvalidNodeInContext { what : what.to_string() }, loc);
        self.err_node(proto, loc)
    }

    /// Reconcile an inferred type with the prototype. `Undef` on either
    /// side defers to the other; otherwise the two must agree up to
    /// reduction, and disagreement yields a fresh untyped error.
    fn match_type(&mut self, from : NodeId, to : NodeId, loc : &Loc) -> NodeId {
        if self.m.is_undef(to) {
            return from
        }
        if self.m.is_undef(from) {
            return to
        }
        let from_red = self.m.reduce(from);
        let to_red = self.m.reduce(to);
        if from_red == to_red {
            return from
        }
        self.type_mismatch(to, from, loc)
    }

    /// `node` is already well-typed; make sure its type agrees with the
    /// prototype, returning an error node when it does not.
    fn expect(&mut self, node : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        let ty = self.m.ty(node);
        let matched = self.match_type(ty, proto, loc);
        if self.m.has_err(matched) && !self.m.has_err(ty) {
            matched
        } else {
            node
        }
    }

    fn check_node(&mut self, node : NodeId, proto : NodeId) -> NodeId {
        let loc = self.m.loc(node);
        let kind = self.m.kind(node).clone();

        // A node annotated with a type checks its own annotation against
        // the prototype first; the fixed constants and error nodes carry
        // self-referential or known types and are exempt.
        let mut proto = proto;
        match kind {
            Uni | Star | Nat | Int | Float | Err | Undef => {},
            _ => {
                let ann = self.m.ty(node);
                if !self.m.is_undef(ann) {
                    let ann = self.infer(ann);
                    proto = self.match_type(ann, proto, &loc);
                }
            }
        }

        match kind {
            Uni => {
                let uni = self.m.mk_uni();
                self.expect(uni, proto, &loc)
            },
            Star => {
                let star = self.m.mk_star();
                self.expect(star, proto, &loc)
            },
            Nat => {
                let nat = self.m.mk_nat();
                self.expect(nat, proto, &loc)
            },
            Int => {
                let int = self.m.mk_int();
                self.expect(int, proto, &loc)
            },
            Float => {
                let float = self.m.mk_float();
                self.expect(float, proto, &loc)
            },
            Err => node,
            Undef => self.invalid_in_context("unexpected placeholder in expression position", proto, &loc),
            NodeKind::Lit(lit) => self.check_lit(lit, proto, &loc),
            Var { label } => self.check_var(label, proto, &loc),
            App { left, right } => self.check_app(left, right, proto, &loc),
            Match { pats, vals, arg } => self.check_match(&pats, &vals, arg, proto, &loc),
            Let { vars, vals, body } => self.check_let(&vars, &vals, body, proto, &loc),
            Letrec { vars, vals, body } => self.check_letrec(&vars, &vals, body, proto, &loc),
            Abs { var, body } => self.check_abs(var, body, proto, &loc),
            Arrow { var, codom } => self.check_arrow(var, codom, proto, &loc),
            Record { args, labels } => self.check_record(&args, &labels, proto, &loc),
            Sum { args, labels } => self.check_type_aggregate(true, &args, &labels, proto, &loc),
            Prod { args, labels } => self.check_type_aggregate(false, &args, &labels, proto, &loc),
            Inj { label, arg } => self.check_inj(label, arg, proto, &loc),
            Ext { val, label } => self.check_ext(val, label, proto, &loc),
            Ins { val, label, elem } => self.check_ins(val, label, elem, proto, &loc),
            Top => self.check_top_bot(true, proto, &loc),
            Bot => self.check_top_bot(false, proto, &loc),
        }
    }

    /// Integer literals default to `Nat`, floating-point literals to
    /// `Float 64`; a prototype must be `Nat` or an applied numeric kind.
    fn check_lit(&mut self, lit : Lit, proto : NodeId, loc : &Loc) -> NodeId {
        let ty = if self.m.is_undef(proto) {
            match lit {
                Lit::Int(_) => self.m.mk_nat(),
                Lit::Float(_) => self.m.mk_float_type(64, loc.clone()),
            }
        } else {
            let reduced = self.m.reduce(proto);
            let numeric = match self.m.kind(reduced) {
                Nat => true,
                _ => self.m.is_int_or_float_app(reduced)
            };
            if numeric {
                proto
            } else {
                let what = match lit {
                    Lit::Int(_) => "integer literal",
                    Lit::Float(_) => "floating-point literal",
                };
                self.invalid_type(proto, what, loc);
                self.m.mk_untyped_err(loc.clone())
            }
        };
        self.m.mk_lit(ty, lit, loc.clone())
    }

    fn check_var(&mut self, label : Option<LabelId>, proto : NodeId, loc : &Loc) -> NodeId {
        let label = match label {
            Some(label) => label,
            None => return self.invalid_in_context(
                "unbound variable outside a binder position", proto, loc)
        };
        match self.env.lookup(label) {
            Some(var) => self.expect(var, proto, loc),
            None => {
                self.report(TypeError::UnknownIdentifier { label }, loc);
                self.err_node(proto, loc)
            }
        }
    }

    fn check_app(&mut self, left : NodeId, right : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        let left_loc = self.m.loc(left);
        let left = self.infer(left);
        let left_ty = self.m.ty(left);
        let callee_ty = self.m.reduce(left_ty);
        let (var, _codom) = match self.kind_arrow(callee_ty) {
            Some(parts) => parts,
            None => {
                if !self.m.has_err(left) {
                    self.report(TypeError::NonFunctionCallee { ty : left_ty }, &left_loc);
                }
                return self.err_node(proto, loc)
            }
        };
        let dom = self.m.ty(var);
        let right = self.check_node(right, dom);
        if self.m.has_err(left) || self.m.has_err(right) {
            return self.err_node(proto, loc)
        }
        let app = self.m.mk_app(left, right, loc.clone());
        self.expect(app, proto, loc)
    }

    fn kind_arrow(&self, node : NodeId) -> Option<(NodeId, NodeId)> {
        match self.m.kind(node) {
            Arrow { var, codom } => Some((*var, *codom)),
            _ => None
        }
    }

    fn check_match(&mut self, pats : &[NodeId], vals : &[NodeId], arg : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        let arg = self.infer(arg);
        if self.m.has_err(arg) {
            return self.err_node(proto, loc)
        }
        let arg_ty = self.m.ty(arg);

        // Prepare one cleared slot that all the arms share as peers.
        self.env.push();
        self.env.pop();

        let mut proto = proto;
        let mut new_pats = Vec::with_capacity(pats.len());
        let mut new_vals = Vec::with_capacity(vals.len());
        let mut failed = false;
        for (&pat, &val) in pats.iter().zip(vals.iter()) {
            let pat = self.check_pat(pat, arg_ty);
            self.env.reenter();
            let val = self.check_node(val, proto);
            self.env.pop();
            failed |= self.m.has_err(pat) || self.m.has_err(val);
            proto = self.m.ty(val);
            new_pats.push(pat);
            new_vals.push(val);
        }
        if new_pats.is_empty() {
            return self.invalid_in_context("match requires at least one arm", proto, loc)
        }
        if failed {
            return self.err_node(proto, loc)
        }
        self.m.mk_match(&new_pats, &new_vals, arg, loc.clone())
    }

    /// Patterns check against the scrutinee type and deposit their
    /// variables into the upcoming arm scope.
    fn check_pat(&mut self, pat : NodeId, proto : NodeId) -> NodeId {
        let loc = self.m.loc(pat);
        match self.m.kind(pat).clone() {
            Var { label } => {
                let var = self.m.mk_var(proto, label, loc);
                if let Some(label) = label {
                    self.env.insert_ahead(label, var);
                }
                var
            },
            NodeKind::Lit(lit) => self.check_lit(lit, proto, &loc),
            Record { args, labels } => {
                let reduced = self.m.reduce(proto);
                match self.m.kind(reduced).clone() {
                    Prod { args : field_tys, labels : field_labels } if field_labels == labels => {
                        let mut new_args = Vec::with_capacity(args.len());
                        let mut failed = false;
                        for (&arg, &field_ty) in args.iter().zip(field_tys.iter()) {
                            let arg = self.check_pat(arg, field_ty);
                            failed |= self.m.has_err(arg);
                            new_args.push(arg);
                        }
                        if failed {
                            return self.err_node(proto, &loc)
                        }
                        self.m.mk_record(&new_args, &labels, loc)
                    },
                    _ => {
                        self.invalid_type(proto, "record pattern", &loc);
                        self.err_node(proto, &loc)
                    }
                }
            },
            Inj { label, arg } => {
                let reduced = self.m.reduce(proto);
                let elem_ty = match self.m.kind(reduced) {
                    Sum { args, labels } => find_label(labels, label).map(|index| args[index]),
                    _ => None
                };
                match elem_ty {
                    Some(elem_ty) => {
                        let arg = self.check_pat(arg, elem_ty);
                        if self.m.has_err(arg) {
                            return self.err_node(proto, &loc)
                        }
                        self.m.mk_inj(proto, label, arg, loc)
                    },
                    None => {
                        self.invalid_type(proto, "injection pattern", &loc);
                        self.err_node(proto, &loc)
                    }
                }
            },
            _ => {
                self.report(TypeError::InvalidPattern, &loc);
                self.err_node(proto, &loc)
            }
        }
    }

    /// One let binding : an annotated variable checks its value against
    /// the annotation, an unannotated one is named at the value's
    /// inferred type. The variable lands in the upcoming body scope, the
    /// value is checked in the enclosing one.
    fn check_binding(&mut self, var : NodeId, val : NodeId) -> (NodeId, NodeId) {
        let loc = self.m.loc(var);
        match self.m.kind(var).clone() {
            Var { label } => {
                let ann = self.m.ty(var);
                let (new_var, new_val) = if !self.m.is_undef(ann) {
                    let ann = self.infer(ann);
                    let val = self.check_node(val, ann);
                    (self.m.mk_var(ann, label, loc), val)
                } else {
                    let val = self.infer(val);
                    let val_ty = self.m.ty(val);
                    (self.m.mk_var(val_ty, label, loc), val)
                };
                if let Some(label) = label {
                    self.env.insert_ahead(label, new_var);
                }
                (new_var, new_val)
            },
            _ => {
                let undef = self.m.mk_undef();
                let err = self.invalid_in_context("binding position requires a variable", undef, &loc);
                (err, err)
            }
        }
    }

    fn check_let(&mut self, vars : &[NodeId], vals : &[NodeId], body : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        self.env.push();
        self.env.pop();

        let mut new_vars = Vec::with_capacity(vars.len());
        let mut new_vals = Vec::with_capacity(vals.len());
        let mut failed = false;
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            let (var, val) = self.check_binding(var, val);
            failed |= self.m.has_err(var) || self.m.has_err(val);
            new_vars.push(var);
            new_vals.push(val);
        }

        self.env.reenter();
        let body = self.check_node(body, proto);
        self.env.pop();

        if failed || self.m.has_err(body) {
            return self.err_node(proto, loc)
        }
        let res = self.m.mk_let(&new_vars, &new_vals, body, loc.clone());
        self.expect(res, proto, loc)
    }

    /// All letrec variables enter the scope before any value is checked;
    /// that is why each of them must carry an annotation.
    fn check_letrec(&mut self, vars : &[NodeId], vals : &[NodeId], body : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        self.env.push();

        let mut new_vars = Vec::with_capacity(vars.len());
        let mut failed = false;
        for &var in vars.iter() {
            let var_loc = self.m.loc(var);
            match self.m.kind(var).clone() {
                Var { label } => {
                    let ann = self.m.ty(var);
                    if self.m.is_undef(ann) {
                        let name = label.map(|l| self.m.label_name(l).to_string())
                            .unwrap_or_else(|| "_".to_string());
                        let what = format!(
                            "recursive binding '{}' requires a type annotation", name);
                        self.report(TypeError::InvalidNodeInContext { what }, &var_loc);
                        failed = true;
                        new_vars.push(self.m.mk_untyped_err(var_loc));
                    } else {
                        let ann = self.infer(ann);
                        let new_var = self.m.mk_var(ann, label, var_loc);
                        if let Some(label) = label {
                            self.env.insert(label, new_var);
                        }
                        failed |= self.m.has_err(new_var);
                        new_vars.push(new_var);
                    }
                },
                _ => {
                    let what = "binding position requires a variable".to_string();
                    self.report(TypeError::InvalidNodeInContext { what }, &var_loc);
                    failed = true;
                    new_vars.push(self.m.mk_untyped_err(var_loc));
                }
            }
        }

        let mut new_vals = Vec::with_capacity(vals.len());
        for (&val, &var) in vals.iter().zip(new_vars.iter()) {
            let var_ty = self.m.ty(var);
            let val = self.check_node(val, var_ty);
            failed |= self.m.has_err(val);
            new_vals.push(val);
        }

        let body = self.check_node(body, proto);
        self.env.pop();

        if failed || self.m.has_err(body) {
            return self.err_node(proto, loc)
        }
        let res = self.m.mk_letrec(&new_vars, &new_vals, body, loc.clone());
        self.expect(res, proto, loc)
    }

    /// An abstraction checks against an arrow prototype piecewise : the
    /// parameter annotation (when present) must agree with the domain,
    /// and the body checks against the codomain instantiated at the new
    /// parameter. With no prototype the annotation is required.
    fn check_abs(&mut self, var : NodeId, body : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        let var_loc = self.m.loc(var);
        let label = match self.m.kind(var) {
            Var { label } => *label,
            _ => return self.invalid_in_context("binding position requires a variable", proto, loc)
        };
        let reduced_proto = self.m.reduce(proto);
        let proto_arrow = self.kind_arrow(reduced_proto);

        let ann = self.m.ty(var);
        let dom = if !self.m.is_undef(ann) {
            let ann = self.infer(ann);
            match proto_arrow {
                Some((pvar, _)) => {
                    let pdom = self.m.ty(pvar);
                    self.match_type(ann, pdom, &var_loc)
                },
                None => ann
            }
        } else {
            match proto_arrow {
                Some((pvar, _)) => self.m.ty(pvar),
                None => return self.invalid_in_context(
                    "cannot infer the parameter type of this abstraction", proto, loc)
            }
        };
        if self.m.has_err(dom) {
            return self.err_node(proto, loc)
        }

        let new_var = self.m.mk_var(dom, label, var_loc);
        let body_proto = match proto_arrow {
            Some((pvar, codom)) => {
                if self.m.is_unbound_var(pvar) {
                    codom
                } else {
                    self.m.replace_var(codom, pvar, new_var)
                }
            },
            None => self.m.mk_undef()
        };

        if let Some(label) = label {
            self.env.insert_ahead(label, new_var);
        }
        self.env.reenter();
        let body = self.check_node(body, body_proto);
        self.env.pop();

        if self.m.has_err(body) {
            return self.err_node(proto, loc)
        }
        // The prototype (when present) was enforced piecewise above, so
        // no further reconciliation against the built arrow is needed.
        self.m.mk_abs(new_var, body, loc.clone())
    }

    fn check_arrow(&mut self, var : NodeId, codom : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        let var_loc = self.m.loc(var);
        let label = match self.m.kind(var) {
            Var { label } => *label,
            _ => return self.invalid_in_context("binding position requires a variable", proto, loc)
        };
        let ann = self.m.ty(var);
        if self.m.is_undef(ann) {
            return self.invalid_in_context("function type parameter requires a type", proto, loc)
        }
        let dom = self.infer(ann);
        if self.m.has_err(dom) {
            return self.err_node(proto, loc)
        }
        let new_var = self.m.mk_var(dom, label, var_loc);
        if let Some(label) = label {
            self.env.insert_ahead(label, new_var);
        }
        self.env.reenter();
        let codom = self.infer(codom);
        self.env.pop();
        if self.m.has_err(codom) {
            return self.err_node(proto, loc)
        }
        let res = self.m.mk_arrow(new_var, codom, loc.clone());
        self.expect(res, proto, loc)
    }

    fn check_record(&mut self, args : &[NodeId], labels : &[LabelId], proto : NodeId, loc : &Loc) -> NodeId {
        let reduced = self.m.reduce(proto);
        if self.m.is_undef(reduced) {
            let mut new_args = Vec::with_capacity(args.len());
            let mut failed = false;
            for &arg in args.iter() {
                let arg = self.infer(arg);
                failed |= self.m.has_err(arg);
                new_args.push(arg);
            }
            if failed {
                return self.err_node(proto, loc)
            }
            return self.m.mk_record(&new_args, labels, loc.clone())
        }
        match self.m.kind(reduced).clone() {
            Prod { args : field_tys, labels : field_labels } if field_labels.as_ref() == labels => {
                let mut new_args = Vec::with_capacity(args.len());
                let mut failed = false;
                for (&arg, &field_ty) in args.iter().zip(field_tys.iter()) {
                    let arg = self.check_node(arg, field_ty);
                    failed |= self.m.has_err(arg);
                    new_args.push(arg);
                }
                if failed {
                    return self.err_node(proto, loc)
                }
                let res = self.m.mk_record(&new_args, labels, loc.clone());
                self.expect(res, proto, loc)
            },
            _ => {
                self.invalid_type(proto, "record value", loc);
                self.err_node(proto, loc)
            }
        }
    }

    /// Sum and product types : every member must itself be a type.
    fn check_type_aggregate(&mut self, is_sum : bool, args : &[NodeId], labels : &[LabelId], proto : NodeId, loc : &Loc) -> NodeId {
        let star = self.m.mk_star();
        let mut new_args = Vec::with_capacity(args.len());
        let mut failed = false;
        for &arg in args.iter() {
            let arg = self.check_node(arg, star);
            failed |= self.m.has_err(arg);
            new_args.push(arg);
        }
        if failed {
            return self.err_node(proto, loc)
        }
        let res = if is_sum {
            self.m.mk_sum(&new_args, labels, loc.clone())
        } else {
            self.m.mk_prod(&new_args, labels, loc.clone())
        };
        self.expect(res, proto, loc)
    }

    fn check_inj(&mut self, label : LabelId, arg : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        if self.m.is_undef(proto) {
            return self.invalid_in_context(
                "cannot infer the sum type of this injection", proto, loc)
        }
        let reduced = self.m.reduce(proto);
        let elem_ty = match self.m.kind(reduced) {
            Sum { args, labels } => find_label(labels, label).map(|index| args[index]),
            _ => None
        };
        match elem_ty {
            Some(elem_ty) => {
                let arg = self.check_node(arg, elem_ty);
                if self.m.has_err(arg) {
                    return self.err_node(proto, loc)
                }
                self.m.mk_inj(reduced, label, arg, loc.clone())
            },
            None => {
                self.invalid_type(proto, "injection", loc);
                self.err_node(proto, loc)
            }
        }
    }

    fn check_ext(&mut self, val : NodeId, label : LabelId, proto : NodeId, loc : &Loc) -> NodeId {
        let val = self.infer(val);
        if self.m.has_err(val) {
            return self.err_node(proto, loc)
        }
        let val_ty = self.m.ty(val);
        match self.m.elem_type(val_ty, label) {
            Some(_) => {
                let res = self.m.mk_ext(val, label, loc.clone());
                self.expect(res, proto, loc)
            },
            None => {
                let what = format!("extraction of field '{}'", self.m.label_name(label));
                self.invalid_type(val_ty, &what, loc);
                self.err_node(proto, loc)
            }
        }
    }

    fn check_ins(&mut self, val : NodeId, label : LabelId, elem : NodeId, proto : NodeId, loc : &Loc) -> NodeId {
        let val = self.infer(val);
        if self.m.has_err(val) {
            return self.err_node(proto, loc)
        }
        let val_ty = self.m.ty(val);
        match self.m.elem_type(val_ty, label) {
            Some(elem_ty) => {
                let elem = self.check_node(elem, elem_ty);
                if self.m.has_err(elem) {
                    return self.err_node(proto, loc)
                }
                let res = self.m.mk_ins(val, label, elem, loc.clone());
                self.expect(res, proto, loc)
            },
            None => {
                let what = format!("insertion of field '{}'", self.m.label_name(label));
                self.invalid_type(val_ty, &what, loc);
                self.err_node(proto, loc)
            }
        }
    }

    fn check_top_bot(&mut self, is_top : bool, proto : NodeId, loc : &Loc) -> NodeId {
        if self.m.is_undef(proto) {
            return self.invalid_in_context("cannot infer the type of this value", proto, loc)
        }
        if self.m.has_err(proto) {
            return self.err_node(proto, loc)
        }
        if is_top {
            self.m.mk_top(proto, loc.clone())
        } else {
            self.m.mk_bot(proto, loc.clone())
        }
    }
}
