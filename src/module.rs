use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use indexmap::{ IndexMap, IndexSet };

use crate::log::Loc;
use crate::node::{ LabelId, Lit, Node, NodeId, NodeKey, NodeKind, VarSetId };

use NodeKind::*;

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// Owner of one IR graph : the node arena, the interning tables for
/// nodes, labels and variable sets, and the precomputed constants that
/// terminate the type ladder. Nodes are never freed individually;
/// dropping the module drops everything it ever built.
///
/// Expressions are hash-consed. Variables are represented by name under
/// the assumption that there is no shadowing : every bound variable has
/// a globally unique identity, which is what allows substitution to be
/// driven by interned sets of variables instead of indices.
pub struct Module {
    nodes : Vec<Node>,
    node_table : HashMap<NodeKey, NodeId>,
    labels : FxIndexMap<Box<str>, Loc>,
    var_sets : FxIndexSet<Box<[NodeId]>>,
    uni : NodeId,
    star : NodeId,
    nat : NodeId,
    int : NodeId,
    float : NodeId,
    undef : NodeId,
    empty_vars : VarSetId,
}

/// Position of `label` in a parallel label array.
pub fn find_label(labels : &[LabelId], label : LabelId) -> Option<usize> {
    labels.iter().position(|l| *l == label)
}

impl Module {
    pub fn new() -> Self {
        let mut module = Module {
            nodes : Vec::with_capacity(1000),
            node_table : HashMap::with_capacity(1000),
            labels : FxIndexMap::default(),
            var_sets : FxIndexSet::default(),
            uni : NodeId(0),
            star : NodeId(0),
            nat : NodeId(0),
            int : NodeId(0),
            float : NodeId(0),
            undef : NodeId(0),
            empty_vars : VarSetId(0),
        };
        module.empty_vars = module.intern_vars(&[]);
        // The constants close the type ladder : `uni` and `undef` are
        // their own types, everything else reaches `uni` in finitely
        // many `.ty` steps.
        module.uni = module.push_constant(Uni, None);
        module.star = module.push_constant(Star, Some(module.uni));
        module.nat = module.push_constant(Nat, Some(module.star));
        module.undef = module.push_constant(Undef, None);
        let bitwidth = module.mk_unbound_var(module.nat, Loc::default());
        let numeric_kind = module.mk_arrow(bitwidth, module.star, Loc::default());
        module.int = module.push_constant(Int, Some(numeric_kind));
        module.float = module.push_constant(Float, Some(numeric_kind));
        module
    }

    fn push_constant(&mut self, kind : NodeKind, ty : Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            has_err : match kind { Err => true, _ => false },
            kind,
            ty : ty.unwrap_or(id),
            loc : Loc::default(),
            depth : 0,
            free_vars : self.empty_vars,
            decl_vars : self.empty_vars,
        });
        id
    }

    // Inspection ------------------------------------------------------------------

    pub fn node(&self, node : NodeId) -> &Node {
        &self.nodes[node.index()]
    }

    pub fn kind(&self, node : NodeId) -> &NodeKind {
        &self.nodes[node.index()].kind
    }

    pub fn ty(&self, node : NodeId) -> NodeId {
        self.nodes[node.index()].ty
    }

    pub fn loc(&self, node : NodeId) -> Loc {
        self.nodes[node.index()].loc.clone()
    }

    pub fn depth(&self, node : NodeId) -> u32 {
        self.nodes[node.index()].depth
    }

    pub fn free_vars(&self, node : NodeId) -> VarSetId {
        self.nodes[node.index()].free_vars
    }

    pub fn decl_vars(&self, node : NodeId) -> VarSetId {
        self.nodes[node.index()].decl_vars
    }

    pub fn mk_uni(&self) -> NodeId { self.uni }
    pub fn mk_star(&self) -> NodeId { self.star }
    pub fn mk_nat(&self) -> NodeId { self.nat }
    pub fn mk_int(&self) -> NodeId { self.int }
    pub fn mk_float(&self) -> NodeId { self.float }
    pub fn mk_undef(&self) -> NodeId { self.undef }

    // Variable sets ---------------------------------------------------------------

    fn intern_vars(&mut self, sorted : &[NodeId]) -> VarSetId {
        if let Some((index, _)) = self.var_sets.get_full(sorted) {
            return VarSetId(index as u32)
        }
        let (index, _) = self.var_sets.insert_full(sorted.to_vec().into_boxed_slice());
        VarSetId(index as u32)
    }

    /// Sort and intern a set of variables. The input must not contain
    /// duplicates.
    pub fn new_vars(&mut self, vars : &[NodeId]) -> VarSetId {
        let mut sorted = vars.to_vec();
        sorted.sort();
        debug_assert!(
            sorted.windows(2).all(|w| w[0] < w[1]),
            "variable sets must not contain duplicates");
        self.intern_vars(&sorted)
    }

    pub fn empty_vars(&self) -> VarSetId {
        self.empty_vars
    }

    pub fn vars(&self, set : VarSetId) -> &[NodeId] {
        match self.var_sets.get_index(set.index()) {
            Some(vars) => vars,
            None => panic!("dangling variable-set handle")
        }
    }

    pub fn union_vars(&mut self, set1 : VarSetId, set2 : VarSetId) -> VarSetId {
        if set1 == set2 {
            return set1
        }
        let merged = {
            let (vars1, vars2) = (self.vars(set1), self.vars(set2));
            let mut merged = Vec::with_capacity(vars1.len() + vars2.len());
            let (mut i, mut j) = (0, 0);
            while i < vars1.len() && j < vars2.len() {
                if vars1[i] < vars2[j] {
                    merged.push(vars1[i]);
                    i += 1;
                } else if vars1[i] > vars2[j] {
                    merged.push(vars2[j]);
                    j += 1;
                } else {
                    merged.push(vars1[i]);
                    i += 1;
                    j += 1;
                }
            }
            merged.extend_from_slice(&vars1[i..]);
            merged.extend_from_slice(&vars2[j..]);
            merged
        };
        self.intern_vars(&merged)
    }

    pub fn intr_vars(&mut self, set1 : VarSetId, set2 : VarSetId) -> VarSetId {
        if set1 == set2 {
            return set1
        }
        let merged = {
            let (vars1, vars2) = (self.vars(set1), self.vars(set2));
            let mut merged = Vec::with_capacity(vars1.len().min(vars2.len()));
            let (mut i, mut j) = (0, 0);
            while i < vars1.len() && j < vars2.len() {
                if vars1[i] < vars2[j] {
                    i += 1;
                } else if vars1[i] > vars2[j] {
                    j += 1;
                } else {
                    merged.push(vars1[i]);
                    i += 1;
                    j += 1;
                }
            }
            merged
        };
        self.intern_vars(&merged)
    }

    pub fn diff_vars(&mut self, set1 : VarSetId, set2 : VarSetId) -> VarSetId {
        let merged = {
            let (vars1, vars2) = (self.vars(set1), self.vars(set2));
            let mut merged = Vec::with_capacity(vars1.len());
            let (mut i, mut j) = (0, 0);
            while i < vars1.len() && j < vars2.len() {
                if vars1[i] < vars2[j] {
                    merged.push(vars1[i]);
                    i += 1;
                } else if vars1[i] > vars2[j] {
                    j += 1;
                } else {
                    i += 1;
                    j += 1;
                }
            }
            merged.extend_from_slice(&vars1[i..]);
            merged
        };
        self.intern_vars(&merged)
    }

    pub fn contains_var(&self, set : VarSetId, var : NodeId) -> bool {
        self.vars(set).binary_search(&var).is_ok()
    }

    /// Linear overlap test; true as soon as one common element is found.
    pub fn contains_any(&self, set1 : VarSetId, set2 : VarSetId) -> bool {
        let (vars1, vars2) = (self.vars(set1), self.vars(set2));
        let (mut i, mut j) = (0, 0);
        while i < vars1.len() && j < vars2.len() {
            if vars1[i] < vars2[j] {
                i += 1;
            } else if vars1[i] > vars2[j] {
                j += 1;
            } else {
                return true
            }
        }
        false
    }

    // Labels ----------------------------------------------------------------------

    /// Intern a label by name. The location of the first occurrence is
    /// the one that sticks, and is only ever used for diagnostics.
    pub fn new_label(&mut self, name : &str, loc : Loc) -> LabelId {
        if let Some((index, _, _)) = self.labels.get_full(name) {
            return LabelId(index as u32)
        }
        let (index, _) = self.labels.insert_full(Box::from(name), loc);
        LabelId(index as u32)
    }

    pub fn label_name(&self, label : LabelId) -> &str {
        match self.labels.get_index(label.index()) {
            Some((name, _)) => name,
            None => panic!("dangling label handle")
        }
    }

    pub fn label_loc(&self, label : LabelId) -> &Loc {
        match self.labels.get_index(label.index()) {
            Some((_, loc)) => loc,
            None => panic!("dangling label handle")
        }
    }

    /// Type of field `label` of a value of type `val_type`, or `None`
    /// when the (reduced) type is not an aggregate with that label.
    pub fn elem_type(&mut self, val_type : NodeId, label : LabelId) -> Option<NodeId> {
        let reduced = self.reduce(val_type);
        match self.kind(reduced) {
            Sum { args, labels } | Prod { args, labels } =>
                find_label(labels, label).map(|index| args[index]),
            _ => None
        }
    }

    // Hash consing ----------------------------------------------------------------

    /// Every constructor funnels through here : compose the node with its
    /// children already interned, derive the cached facts, hand the result
    /// to the simplifier, and record the mapping from the *raw* shape to
    /// the canonical one. A later construction of an equivalent shape
    /// short-circuits straight to the simplified handle.
    pub(crate) fn intern(&mut self, kind : NodeKind, ty : NodeId, loc : Loc) -> NodeId {
        let key = NodeKey {
            err_loc : match kind { Err => Some(loc.clone()), _ => None },
            kind,
            ty,
        };
        if let Some(&found) = self.node_table.get(&key) {
            return found
        }
        let id = NodeId(self.nodes.len() as u32);
        let node = self.seal(&key.kind, ty, loc, id);
        self.nodes.push(node);
        let res = self.simplify(id);
        debug_assert!(
            !self.node_table.contains_key(&key),
            "simplification must not re-create the node being interned");
        self.node_table.insert(key, res);
        res
    }

    /// Pre-typed construction surface for the lowering phase and for
    /// checker inputs : interns the shape with `ty` (or the `Undef`
    /// sentinel) without simplification and without any of the typed
    /// constructors' preconditions. The checker re-emits everything it
    /// accepts through the typed constructors, so these nodes never leak
    /// into canonical output.
    pub fn mk_unchecked(&mut self, kind : NodeKind, ty : Option<NodeId>, loc : Loc) -> NodeId {
        let ty = ty.unwrap_or(self.undef);
        let key = NodeKey {
            err_loc : match kind { Err => Some(loc.clone()), _ => None },
            kind,
            ty,
        };
        if let Some(&found) = self.node_table.get(&key) {
            return found
        }
        let id = NodeId(self.nodes.len() as u32);
        let node = self.seal(&key.kind, ty, loc, id);
        self.nodes.push(node);
        id
    }

    /// Derive depth, free variables, declared variables and the error bit
    /// from the children. `id` is the slot the node is about to occupy,
    /// needed only so a bound variable can declare itself.
    fn seal(&mut self, kind : &NodeKind, ty : NodeId, loc : Loc, id : NodeId) -> Node {
        let mut depth = 0u32;
        let mut free_vars = self.free_vars(ty);
        let mut decl_vars = self.empty_vars;
        let mut has_err = match kind { Err => true, _ => false };
        has_err |= self.nodes[ty.index()].has_err;

        match kind {
            Sum { args, .. } | Prod { args, .. } | Record { args, .. } => {
                for &arg in args.iter() {
                    depth = depth.max(self.depth(arg));
                    has_err |= self.has_err(arg);
                    let arg_free = self.free_vars(arg);
                    let arg_decl = self.decl_vars(arg);
                    free_vars = self.union_vars(free_vars, arg_free);
                    decl_vars = self.union_vars(decl_vars, arg_decl);
                }
            },
            Inj { arg, .. } => {
                depth = self.depth(*arg);
                has_err |= self.has_err(*arg);
                let arg_free = self.free_vars(*arg);
                free_vars = self.union_vars(free_vars, arg_free);
                decl_vars = self.decl_vars(*arg);
            },
            Ins { val, elem, .. } => {
                depth = self.depth(*val).max(self.depth(*elem));
                has_err |= self.has_err(*val) | self.has_err(*elem);
                let val_free = self.free_vars(*val);
                let elem_free = self.free_vars(*elem);
                free_vars = self.union_vars(free_vars, val_free);
                free_vars = self.union_vars(free_vars, elem_free);
            },
            Ext { val, .. } => {
                depth = self.depth(*val);
                has_err |= self.has_err(*val);
                let val_free = self.free_vars(*val);
                free_vars = self.union_vars(free_vars, val_free);
            },
            Arrow { var, codom } => {
                depth = self.depth(*codom) + 1;
                has_err |= self.has_err(*var) | self.has_err(*codom);
                let codom_free = self.free_vars(*codom);
                free_vars = self.union_vars(free_vars, codom_free);
                if !self.is_unbound_var(*var) {
                    let bound = self.new_vars(&[*var]);
                    free_vars = self.diff_vars(free_vars, bound);
                }
            },
            Abs { var, body } => {
                depth = self.depth(*body) + 1;
                has_err |= self.has_err(*var) | self.has_err(*body);
                let body_free = self.free_vars(*body);
                free_vars = self.union_vars(free_vars, body_free);
                if !self.is_unbound_var(*var) {
                    let bound = self.new_vars(&[*var]);
                    free_vars = self.diff_vars(free_vars, bound);
                }
            },
            App { left, right } => {
                depth = self.depth(*left).max(self.depth(*right));
                has_err |= self.has_err(*left) | self.has_err(*right);
                let left_free = self.free_vars(*left);
                let right_free = self.free_vars(*right);
                free_vars = self.union_vars(free_vars, left_free);
                free_vars = self.union_vars(free_vars, right_free);
            },
            Let { vars, vals, body } | Letrec { vars, vals, body } => {
                depth = self.depth(*body);
                has_err |= self.has_err(*body);
                let body_free = self.free_vars(*body);
                free_vars = self.union_vars(free_vars, body_free);
                for (&var, &val) in vars.iter().zip(vals.iter()) {
                    debug_assert!(!self.is_unbound_var(var), "let-bound variables must be named");
                    depth = depth.max(self.depth(val));
                    has_err |= self.has_err(var) | self.has_err(val);
                    let val_free = self.free_vars(val);
                    free_vars = self.union_vars(free_vars, val_free);
                }
                let bound = self.new_vars(vars);
                free_vars = self.diff_vars(free_vars, bound);
                depth += vars.len() as u32;
            },
            Match { pats, vals, arg } => {
                for (&pat, &val) in pats.iter().zip(vals.iter()) {
                    depth = depth.max(self.depth(val));
                    has_err |= self.has_err(pat) | self.has_err(val);
                    let val_free = self.free_vars(val);
                    let pat_decl = self.decl_vars(pat);
                    let arm_free = self.diff_vars(val_free, pat_decl);
                    free_vars = self.union_vars(free_vars, arm_free);
                }
                has_err |= self.has_err(*arg);
                let arg_free = self.free_vars(*arg);
                free_vars = self.union_vars(free_vars, arg_free);
                depth += pats.len() as u32;
            },
            Var { label } => {
                if label.is_some() {
                    decl_vars = self.new_vars(&[id]);
                    free_vars = self.union_vars(free_vars, decl_vars);
                }
            },
            Uni | Star | Nat | Int | Float | Undef | Err | Top | Bot | NodeKind::Lit(_) => {}
        }

        Node {
            kind : kind.clone(),
            ty,
            loc,
            depth,
            free_vars,
            decl_vars,
            has_err,
        }
    }

    // Constructors ----------------------------------------------------------------

    /// Failure sentinel carrying the type the failed node should have had.
    /// Distinct error sites stay distinct (the location is part of the
    /// identity of typed error nodes).
    pub fn mk_err(&mut self, ty : NodeId, loc : Loc) -> NodeId {
        self.intern(Err, ty, loc)
    }

    /// The untyped failure sentinel : its type is itself, and every call
    /// produces a fresh node, so unrelated failures never merge.
    pub fn mk_untyped_err(&mut self, loc : Loc) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind : Err,
            ty : id,
            loc,
            depth : 0,
            free_vars : self.empty_vars,
            decl_vars : self.empty_vars,
            has_err : true,
        });
        id
    }

    /// A named variable. Freshness is the caller's contract : the engine
    /// assumes no shadowing, so a label must not be reused for a second
    /// binder while the first is in scope.
    pub fn mk_var(&mut self, ty : NodeId, label : Option<LabelId>, loc : Loc) -> NodeId {
        self.intern(Var { label }, ty, loc)
    }

    /// The placeholder formal of a non-dependent arrow or abstraction.
    pub fn mk_unbound_var(&mut self, ty : NodeId, loc : Loc) -> NodeId {
        self.mk_var(ty, None, loc)
    }

    pub fn mk_top(&mut self, ty : NodeId, loc : Loc) -> NodeId {
        self.intern(Top, ty, loc)
    }

    pub fn mk_bot(&mut self, ty : NodeId, loc : Loc) -> NodeId {
        self.intern(Bot, ty, loc)
    }

    pub fn mk_lit(&mut self, ty : NodeId, lit : Lit, loc : Loc) -> NodeId {
        self.intern(NodeKind::Lit(lit), ty, loc)
    }

    /// An integer literal of type `Nat`, the default for bitwidths.
    pub fn mk_nat_lit(&mut self, value : u64, loc : Loc) -> NodeId {
        self.mk_lit(self.nat, Lit::Int(value), loc)
    }

    /// `Int w` : the integer kind constructor applied to a bitwidth.
    pub fn mk_int_type(&mut self, bitwidth : u64, loc : Loc) -> NodeId {
        let width = self.mk_nat_lit(bitwidth, loc.clone());
        self.mk_app(self.int, width, loc)
    }

    /// `Float w` : the floating-point kind constructor applied to a bitwidth.
    pub fn mk_float_type(&mut self, bitwidth : u64, loc : Loc) -> NodeId {
        let width = self.mk_nat_lit(bitwidth, loc.clone());
        self.mk_app(self.float, width, loc)
    }

    pub fn mk_sum(&mut self, args : &[NodeId], labels : &[LabelId], loc : Loc) -> NodeId {
        debug_assert_eq!(args.len(), labels.len());
        self.intern(Sum {
            args : args.to_vec().into_boxed_slice(),
            labels : labels.to_vec().into_boxed_slice(),
        }, self.star, loc)
    }

    pub fn mk_prod(&mut self, args : &[NodeId], labels : &[LabelId], loc : Loc) -> NodeId {
        debug_assert_eq!(args.len(), labels.len());
        debug_assert!(
            args.iter().all(|a| match self.kind(self.ty(*a)) { Star => true, _ => false }),
            "product fields must be types");
        self.intern(Prod {
            args : args.to_vec().into_boxed_slice(),
            labels : labels.to_vec().into_boxed_slice(),
        }, self.star, loc)
    }

    /// A record value; its type is the product of the field types.
    pub fn mk_record(&mut self, args : &[NodeId], labels : &[LabelId], loc : Loc) -> NodeId {
        debug_assert_eq!(args.len(), labels.len());
        let field_types = args.iter().map(|a| self.ty(*a)).collect::<Vec<NodeId>>();
        let ty = self.mk_prod(&field_types, labels, loc.clone());
        self.intern(Record {
            args : args.to_vec().into_boxed_slice(),
            labels : labels.to_vec().into_boxed_slice(),
        }, ty, loc)
    }

    /// A dependent function type. The codomain may mention `var`; when it
    /// does not, the simplifier demotes `var` to an unbound placeholder.
    pub fn mk_arrow(&mut self, var : NodeId, codom : NodeId, loc : Loc) -> NodeId {
        debug_assert!(match self.kind(var) { Var {..} => true, _ => false });
        self.intern(Arrow { var, codom }, self.ty(codom), loc)
    }

    pub fn mk_inj(&mut self, ty : NodeId, label : LabelId, arg : NodeId, loc : Loc) -> NodeId {
        self.intern(Inj { label, arg }, ty, loc)
    }

    /// A value equal to `val` except that field `label` is `elem`.
    pub fn mk_ins(&mut self, val : NodeId, label : LabelId, elem : NodeId, loc : Loc) -> NodeId {
        #[cfg(debug_assertions)]
        {
            let expected = self.elem_type(self.ty(val), label);
            let got = self.reduce(self.ty(elem));
            debug_assert!(expected == Some(got), "element type does not match the field type");
        }
        let ty = self.ty(val);
        self.intern(Ins { val, label, elem }, ty, loc)
    }

    /// Extract field `label` from `val`. The label must be a field of the
    /// value's (reduced) type.
    pub fn mk_ext(&mut self, val : NodeId, label : LabelId, loc : Loc) -> NodeId {
        let ty = match self.elem_type(self.ty(val), label) {
            Some(ty) => ty,
            None => panic!("extraction label '{}' is not a field of the value's type",
                self.label_name(label))
        };
        self.intern(Ext { val, label }, ty, loc)
    }

    /// A lambda abstraction; its type is always the corresponding arrow.
    pub fn mk_abs(&mut self, var : NodeId, body : NodeId, loc : Loc) -> NodeId {
        debug_assert!(match self.kind(var) { Var {..} => true, _ => false });
        let body_ty = self.ty(body);
        let ty = self.mk_arrow(var, body_ty, Loc::default());
        self.intern(Abs { var, body }, ty, loc)
    }

    /// Application. The callee's type must reduce to an arrow whose
    /// domain matches the argument's type; the result type is the
    /// codomain with the formal replaced by the argument when the arrow
    /// is dependent.
    pub fn mk_app(&mut self, left : NodeId, right : NodeId, loc : Loc) -> NodeId {
        let left_ty = self.ty(left);
        let callee_ty = self.reduce(left_ty);
        let (var, codom) = match self.kind(callee_ty) {
            Arrow { var, codom } => (*var, *codom),
            _ => panic!("application of a value whose type is not an arrow")
        };
        #[cfg(debug_assertions)]
        {
            let dom = self.reduce(self.ty(var));
            let arg_ty = self.reduce(self.ty(right));
            debug_assert!(dom == arg_ty, "argument type does not match the parameter type");
        }
        let ty = if self.is_unbound_var(var) {
            codom
        } else {
            self.replace_var(codom, var, right)
        };
        self.intern(App { left, right }, ty, loc)
    }

    /// Non-recursive binding group : no value may reference any of the
    /// bound variables.
    pub fn mk_let(&mut self, vars : &[NodeId], vals : &[NodeId], body : NodeId, loc : Loc) -> NodeId {
        self.mk_let_or_letrec(false, vars, vals, body, loc)
    }

    /// Mutually recursive binding group : every bound variable must carry
    /// an explicit type annotation.
    pub fn mk_letrec(&mut self, vars : &[NodeId], vals : &[NodeId], body : NodeId, loc : Loc) -> NodeId {
        self.mk_let_or_letrec(true, vars, vals, body, loc)
    }

    fn mk_let_or_letrec(&mut self, rec : bool, vars : &[NodeId], vals : &[NodeId], body : NodeId, loc : Loc) -> NodeId {
        debug_assert_eq!(vars.len(), vals.len());
        #[cfg(debug_assertions)]
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            let var_ty = self.reduce(self.ty(var));
            let val_ty = self.reduce(self.ty(val));
            debug_assert!(var_ty == val_ty, "bound variable type must match its value type");
        }
        let body_ty = self.ty(body);
        let ty = self.fix_let_type(vars, vals, body_ty);
        let kind = if rec {
            Letrec {
                vars : vars.to_vec().into_boxed_slice(),
                vals : vals.to_vec().into_boxed_slice(),
                body,
            }
        } else {
            Let {
                vars : vars.to_vec().into_boxed_slice(),
                vals : vals.to_vec().into_boxed_slice(),
                body,
            }
        };
        self.intern(kind, ty, loc)
    }

    /// Replace the bound variables in the body type and reduce, until a
    /// fixed point is reached. This may loop forever if the expression
    /// does not terminate.
    fn fix_let_type(&mut self, vars : &[NodeId], vals : &[NodeId], body_ty : NodeId) -> NodeId {
        let mut ty = body_ty;
        loop {
            let old_ty = ty;
            ty = self.replace_vars(ty, vars, vals);
            ty = self.reduce(ty);
            if ty == old_ty {
                return ty
            }
        }
    }

    /// First-match expression. Arms are tried in order; all arm values
    /// share one type, which becomes the type of the whole match.
    pub fn mk_match(&mut self, pats : &[NodeId], vals : &[NodeId], arg : NodeId, loc : Loc) -> NodeId {
        assert!(!pats.is_empty(), "match requires at least one arm");
        debug_assert_eq!(pats.len(), vals.len());
        debug_assert!(pats.iter().all(|p| self.is_pat(*p)), "invalid pattern in match arm");
        debug_assert!(
            vals.iter().all(|v| self.ty(*v) == self.ty(vals[0])),
            "match arm values must share one type");
        let ty = self.ty(vals[0]);
        self.intern(Match {
            pats : pats.to_vec().into_boxed_slice(),
            vals : vals.to_vec().into_boxed_slice(),
            arg,
        }, ty, loc)
    }

    // Rebuild / import ------------------------------------------------------------

    /// Reconstruct a node through its own constructor, re-triggering
    /// simplification. On canonical nodes this is the identity.
    pub fn rebuild(&mut self, node : NodeId) -> NodeId {
        let loc = self.loc(node);
        let ty = self.ty(node);
        match self.kind(node).clone() {
            Uni => self.mk_uni(),
            Star => self.mk_star(),
            Nat => self.mk_nat(),
            Int => self.mk_int(),
            Float => self.mk_float(),
            Undef => self.mk_undef(),
            Err => {
                if self.is_untyped_err(node) {
                    self.mk_untyped_err(loc)
                } else {
                    self.mk_err(ty, loc)
                }
            },
            Top => self.mk_top(ty, loc),
            Bot => self.mk_bot(ty, loc),
            NodeKind::Lit(lit) => self.mk_lit(ty, lit, loc),
            Var { label } => self.mk_var(ty, label, loc),
            Sum { args, labels } => self.mk_sum(&args, &labels, loc),
            Prod { args, labels } => self.mk_prod(&args, &labels, loc),
            Record { args, labels } => self.mk_record(&args, &labels, loc),
            Ext { val, label } => self.mk_ext(val, label, loc),
            Ins { val, label, elem } => self.mk_ins(val, label, elem, loc),
            Inj { label, arg } => self.mk_inj(ty, label, arg, loc),
            Arrow { var, codom } => self.mk_arrow(var, codom, loc),
            Abs { var, body } => self.mk_abs(var, body, loc),
            App { left, right } => self.mk_app(left, right, loc),
            Let { vars, vals, body } => self.mk_let(&vars, &vals, body, loc),
            Letrec { vars, vals, body } => self.mk_letrec(&vars, &vals, body, loc),
            Match { pats, vals, arg } => self.mk_match(&pats, &vals, arg, loc),
        }
    }

    /// Import a node from another module by structural reconstruction,
    /// sharing already-imported subterms through a memo table.
    pub fn import(&mut self, other : &Module, node : NodeId) -> NodeId {
        let mut memo : HashMap<NodeId, NodeId> = HashMap::with_capacity(16);
        self.import_rec(other, node, &mut memo)
    }

    fn import_label(&mut self, other : &Module, label : LabelId) -> LabelId {
        let loc = other.label_loc(label).clone();
        self.new_label(other.label_name(label), loc)
    }

    fn import_labels(&mut self, other : &Module, labels : &[LabelId]) -> Vec<LabelId> {
        labels.iter().map(|l| self.import_label(other, *l)).collect()
    }

    fn import_all(&mut self, other : &Module, nodes : &[NodeId], memo : &mut HashMap<NodeId, NodeId>) -> Vec<NodeId> {
        nodes.iter().map(|n| self.import_rec(other, *n, memo)).collect()
    }

    fn import_rec(&mut self, other : &Module, node : NodeId, memo : &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&done) = memo.get(&node) {
            return done
        }
        let loc = other.loc(node);
        let res = match other.kind(node).clone() {
            Uni => self.mk_uni(),
            Star => self.mk_star(),
            Nat => self.mk_nat(),
            Int => self.mk_int(),
            Float => self.mk_float(),
            Undef => self.mk_undef(),
            Err => {
                if other.is_untyped_err(node) {
                    self.mk_untyped_err(loc)
                } else {
                    let ty = self.import_rec(other, other.ty(node), memo);
                    self.mk_err(ty, loc)
                }
            },
            Top => {
                let ty = self.import_rec(other, other.ty(node), memo);
                self.mk_top(ty, loc)
            },
            Bot => {
                let ty = self.import_rec(other, other.ty(node), memo);
                self.mk_bot(ty, loc)
            },
            NodeKind::Lit(lit) => {
                let ty = self.import_rec(other, other.ty(node), memo);
                self.mk_lit(ty, lit, loc)
            },
            Var { label } => {
                let ty = self.import_rec(other, other.ty(node), memo);
                let label = label.map(|l| self.import_label(other, l));
                self.mk_var(ty, label, loc)
            },
            Sum { args, labels } => {
                let args = self.import_all(other, &args, memo);
                let labels = self.import_labels(other, &labels);
                self.mk_sum(&args, &labels, loc)
            },
            Prod { args, labels } => {
                let args = self.import_all(other, &args, memo);
                let labels = self.import_labels(other, &labels);
                self.mk_prod(&args, &labels, loc)
            },
            Record { args, labels } => {
                let args = self.import_all(other, &args, memo);
                let labels = self.import_labels(other, &labels);
                self.mk_record(&args, &labels, loc)
            },
            Ext { val, label } => {
                let val = self.import_rec(other, val, memo);
                let label = self.import_label(other, label);
                self.mk_ext(val, label, loc)
            },
            Ins { val, label, elem } => {
                let val = self.import_rec(other, val, memo);
                let elem = self.import_rec(other, elem, memo);
                let label = self.import_label(other, label);
                self.mk_ins(val, label, elem, loc)
            },
            Inj { label, arg } => {
                let ty = self.import_rec(other, other.ty(node), memo);
                let arg = self.import_rec(other, arg, memo);
                let label = self.import_label(other, label);
                self.mk_inj(ty, label, arg, loc)
            },
            Arrow { var, codom } => {
                let var = self.import_rec(other, var, memo);
                let codom = self.import_rec(other, codom, memo);
                self.mk_arrow(var, codom, loc)
            },
            Abs { var, body } => {
                let var = self.import_rec(other, var, memo);
                let body = self.import_rec(other, body, memo);
                self.mk_abs(var, body, loc)
            },
            App { left, right } => {
                let left = self.import_rec(other, left, memo);
                let right = self.import_rec(other, right, memo);
                self.mk_app(left, right, loc)
            },
            Let { vars, vals, body } => {
                let vars = self.import_all(other, &vars, memo);
                let vals = self.import_all(other, &vals, memo);
                let body = self.import_rec(other, body, memo);
                self.mk_let(&vars, &vals, body, loc)
            },
            Letrec { vars, vals, body } => {
                let vars = self.import_all(other, &vars, memo);
                let vals = self.import_all(other, &vals, memo);
                let body = self.import_rec(other, body, memo);
                self.mk_letrec(&vars, &vals, body, loc)
            },
            Match { pats, vals, arg } => {
                let pats = self.import_all(other, &pats, memo);
                let vals = self.import_all(other, &vals, memo);
                let arg = self.import_rec(other, arg, memo);
                self.mk_match(&pats, &vals, arg, loc)
            },
        };
        memo.insert(node, res);
        res
    }
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}

#[cfg(test)]
mod module_tests {
    use crate::log::Loc;
    use crate::module::Module;
    use crate::node::{ Lit, NodeId, NodeKind };

    fn var(m : &mut Module, name : &str, ty : NodeId) -> NodeId {
        let label = m.new_label(name, Loc::default());
        m.mk_var(ty, Some(label), Loc::default())
    }

    #[test]
    fn interning_shares_handles() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x1 = var(&mut m, "x", nat);
        let x2 = var(&mut m, "x", nat);
        assert_eq!(x1, x2);

        let one1 = m.mk_lit(nat, Lit::Int(1), Loc::default());
        let one2 = m.mk_lit(nat, Lit::Int(1), Loc::default());
        assert_eq!(one1, one2);
        assert_ne!(one1, m.mk_lit(nat, Lit::Int(2), Loc::default()));

        let a = m.new_label("a", Loc::default());
        let r1 = m.mk_record(&[one1], &[a], Loc::default());
        let r2 = m.mk_record(&[one2], &[a], Loc::default());
        assert_eq!(r1, r2);
    }

    #[test]
    fn var_set_algebra() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let a = var(&mut m, "a", nat);
        let b = var(&mut m, "b", nat);
        let c = var(&mut m, "c", nat);

        let sa = m.new_vars(&[a]);
        let sb = m.new_vars(&[b]);
        let sc = m.new_vars(&[c]);
        let sab = m.new_vars(&[a, b]);
        let sbc = m.new_vars(&[b, c]);

        // Commutative, idempotent, associative; equal sets share a handle.
        let u1 = m.union_vars(sab, sbc);
        let u2 = m.union_vars(sbc, sab);
        assert_eq!(u1, u2);
        assert_eq!(m.union_vars(sab, sab), sab);
        let left = { let t = m.union_vars(sa, sb); m.union_vars(t, sc) };
        let right = { let t = m.union_vars(sb, sc); m.union_vars(t, sa) };
        assert_eq!(left, right);
        assert_eq!(left, u1);

        assert_eq!(m.intr_vars(sab, sbc), sb);
        assert_eq!(m.diff_vars(sab, sb), sa);
        assert!(m.contains_var(sab, a));
        assert!(!m.contains_var(sab, c));
        assert!(m.contains_any(sab, sbc));
        assert!(!m.contains_any(sa, sc));
        assert_eq!(m.new_vars(&[b, a]), sab);
    }

    #[test]
    fn free_vars_and_depth() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);

        let id_fn = m.mk_abs(x, x, Loc::default());
        assert!(m.vars(m.free_vars(id_fn)).is_empty());
        assert_eq!(m.depth(id_fn), 1);
        assert_eq!(m.depth(x), 0);

        let bitwidth = m.mk_unbound_var(nat, Loc::default());
        let nat_to_nat = m.mk_arrow(bitwidth, nat, Loc::default());
        let f = var(&mut m, "f", nat_to_nat);
        let app = m.mk_app(f, y, Loc::default());
        let expected = m.new_vars(&[f, y]);
        assert_eq!(m.free_vars(app), expected);

        let one = m.mk_lit(nat, Lit::Int(1), Loc::default());
        let let_y = m.mk_let(&[y], &[one], app, Loc::default());
        let only_f = m.new_vars(&[f]);
        assert_eq!(m.free_vars(let_y), only_f);
        assert_eq!(m.depth(let_y), 1);
    }

    #[test]
    fn type_ladder_reaches_uni() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let one = m.mk_lit(nat, Lit::Int(1), Loc::default());
        let a = m.new_label("a", Loc::default());
        let record = m.mk_record(&[one], &[a], Loc::default());

        let mut node = record;
        let mut steps = 0;
        while node != m.mk_uni() {
            node = m.ty(node);
            steps += 1;
            assert!(steps < 10, "type ladder did not terminate");
        }
    }

    #[test]
    fn dependent_app_type_substitutes() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let star = m.mk_star();
        let bitwidth = m.mk_unbound_var(nat, Loc::default());
        let family_ty = m.mk_arrow(bitwidth, star, Loc::default());
        let p = var(&mut m, "P", family_ty);
        let x = var(&mut m, "x", nat);
        let px = m.mk_app(p, x, Loc::default());
        let arrow = m.mk_arrow(x, px, Loc::default());
        assert!(!m.is_unbound_var(match m.kind(arrow) {
            NodeKind::Arrow { var, .. } => *var,
            _ => panic!("expected an arrow")
        }));

        let f = var(&mut m, "f", arrow);
        let three = m.mk_lit(nat, Lit::Int(3), Loc::default());
        let app = m.mk_app(f, three, Loc::default());
        let expected_ty = m.mk_app(p, three, Loc::default());
        assert_eq!(m.ty(app), expected_ty);
    }

    #[test]
    fn labels_and_elem_types() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let first = Loc::mk("demo.ln", crate::log::Pos::mk(1, 1), crate::log::Pos::mk(1, 2));
        let a1 = m.new_label("a", first.clone());
        let a2 = m.new_label("a", Loc::default());
        assert_eq!(a1, a2);
        assert_eq!(m.label_loc(a1), &first);

        let b = m.new_label("b", Loc::default());
        let prod = m.mk_prod(&[nat, nat], &[a1, b], Loc::default());
        assert_eq!(m.elem_type(prod, a1), Some(nat));
        let missing = m.new_label("zzz", Loc::default());
        assert_eq!(m.elem_type(prod, missing), None);
    }

    #[test]
    fn err_identity() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let loc = Loc::mk("demo.ln", crate::log::Pos::mk(3, 1), crate::log::Pos::mk(3, 4));

        // Untyped errors are always fresh.
        let u1 = m.mk_untyped_err(loc.clone());
        let u2 = m.mk_untyped_err(loc.clone());
        assert_ne!(u1, u2);
        assert!(m.is_untyped_err(u1));
        assert!(m.has_err(u1));

        // Typed errors are keyed on their type and location.
        let e1 = m.mk_err(nat, loc.clone());
        let e2 = m.mk_err(nat, loc.clone());
        assert_eq!(e1, e2);
        let elsewhere = m.mk_err(nat, Loc::default());
        assert_ne!(e1, elsewhere);

        // The error bit propagates to everything built on top.
        let a = m.new_label("a", Loc::default());
        let record = m.mk_record(&[e1], &[a], Loc::default());
        assert!(m.has_err(record));
    }

    #[test]
    fn rebuild_is_identity_on_canonical_nodes() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let id_fn = m.mk_abs(x, x, Loc::default());
        let three = m.mk_lit(nat, Lit::Int(3), Loc::default());
        let app = m.mk_app(id_fn, three, Loc::default());
        let a = m.new_label("a", Loc::default());
        let record = m.mk_record(&[three], &[a], Loc::default());

        for node in [x, id_fn, three, app, record].iter() {
            assert_eq!(m.rebuild(*node), *node);
        }
    }

    #[test]
    fn import_reconstructs_across_modules() {
        let mut m1 = Module::new();
        let nat = m1.mk_nat();
        let one = m1.mk_lit(nat, Lit::Int(1), Loc::default());
        let a = m1.new_label("a", Loc::default());
        let b = m1.new_label("b", Loc::default());
        let record = m1.mk_record(&[one, one], &[a, b], Loc::default());

        let mut m2 = Module::new();
        let imported = m2.import(&m1, record);
        assert_eq!(m2.show(imported), m1.show(record));
        let again = m2.import(&m1, record);
        assert_eq!(imported, again);
        assert_eq!(m2.rebuild(imported), imported);
    }

    #[test]
    fn pattern_queries() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let one = m.mk_lit(nat, Lit::Int(1), Loc::default());
        let v = var(&mut m, "v", nat);
        let a = m.new_label("a", Loc::default());
        let b = m.new_label("b", Loc::default());
        let sum = m.mk_sum(&[nat, nat], &[a, b], Loc::default());
        let inj = m.mk_inj(sum, a, v, Loc::default());
        let record = m.mk_record(&[v, one], &[a, b], Loc::default());

        assert!(m.is_pat(one));
        assert!(m.is_pat(v));
        assert!(m.is_pat(inj));
        assert!(m.is_pat(record));
        let id_fn = m.mk_abs(v, v, Loc::default());
        assert!(!m.is_pat(id_fn));

        assert!(m.is_trivial_pat(v));
        assert!(!m.is_trivial_pat(one));
        assert!(!m.is_trivial_pat(inj));
        let all_vars = m.mk_record(&[v], &[a], Loc::default());
        assert!(m.is_trivial_pat(all_vars));

        let unbound = m.mk_unbound_var(nat, Loc::default());
        assert!(m.is_unbound_var(unbound));
        assert!(!m.is_unbound_var(v));
    }
}
