use hashbrown::HashMap;

use crate::module::Module;
use crate::node::{ NodeId, NodeKind };

use NodeKind::*;

impl Module {
    /// Replace one variable by a value everywhere in `node`.
    pub fn replace_var(&mut self, node : NodeId, from : NodeId, to : NodeId) -> NodeId {
        self.replace_vars(node, &[from], &[to])
    }

    /// Simultaneous, capture-free replacement of a set of variables by
    /// values. Because variable identities are globally unique there is
    /// no renaming : parents along the path of dependence are rebuilt
    /// through their constructors, everything else is shared. The
    /// traversal is driven by an explicit work stack since term depth
    /// can approach the source line count, and results are memoized per
    /// call.
    pub fn replace_vars(&mut self, node : NodeId, vars : &[NodeId], vals : &[NodeId]) -> NodeId {
        debug_assert_eq!(vars.len(), vals.len());
        let mut map : HashMap<NodeId, NodeId> = HashMap::with_capacity(16);
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            map.insert(var, val);
        }

        let mut stack : Vec<NodeId> = Vec::with_capacity(16);
        stack.push(node);
        let mut last = node;
        while let Some(&top) = stack.last() {
            if let Some(done) = self.try_replace(top, vars, &mut stack, &mut map) {
                last = done;
                stack.pop();
            }
        }
        last
    }

    fn needs_replace(&self, node : NodeId, vars : &[NodeId]) -> bool {
        match self.kind(node) {
            Uni | Star | Nat | Int | Float | Undef => false,
            Err if self.ty(node) == node => false,
            _ => {
                let free = self.free_vars(node);
                vars.iter().any(|var| self.contains_var(free, *var))
            }
        }
    }

    /// Look up an already-rewritten child, scheduling it when missing.
    fn fetch(&self, node : NodeId, stack : &mut Vec<NodeId>, map : &HashMap<NodeId, NodeId>) -> Option<NodeId> {
        match map.get(&node) {
            Some(&found) => Some(found),
            None => {
                stack.push(node);
                None
            }
        }
    }

    fn fetch_all(&self, nodes : &[NodeId], stack : &mut Vec<NodeId>, map : &HashMap<NodeId, NodeId>) -> Option<Vec<NodeId>> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut complete = true;
        for &node in nodes {
            match map.get(&node) {
                Some(&found) => out.push(found),
                None => {
                    stack.push(node);
                    complete = false;
                }
            }
        }
        if complete { Some(out) } else { None }
    }

    /// Rewrite one node if all the children it depends on are already in
    /// the memo map; otherwise schedule the missing children and yield.
    fn try_replace(
        &mut self, node : NodeId, vars : &[NodeId],
        stack : &mut Vec<NodeId>, map : &mut HashMap<NodeId, NodeId>) -> Option<NodeId>
    {
        if let Some(&done) = map.get(&node) {
            return Some(done)
        }
        if !self.needs_replace(node, vars) {
            map.insert(node, node);
            return Some(node)
        }

        let loc = self.loc(node);
        let new_node = match self.kind(node).clone() {
            Err => {
                debug_assert!(self.ty(node) != node);
                let ty = self.fetch(self.ty(node), stack, map)?;
                self.mk_err(ty, loc)
            },
            Top => {
                let ty = self.fetch(self.ty(node), stack, map)?;
                self.mk_top(ty, loc)
            },
            Bot => {
                let ty = self.fetch(self.ty(node), stack, map)?;
                self.mk_bot(ty, loc)
            },
            NodeKind::Lit(lit) => {
                let ty = self.fetch(self.ty(node), stack, map)?;
                self.mk_lit(ty, lit, loc)
            },
            Var { label } => {
                // A variable that is not itself replaced but whose type
                // mentions a replaced variable becomes a new variable at
                // the rewritten type.
                let ty = self.fetch(self.ty(node), stack, map)?;
                self.mk_var(ty, label, loc)
            },
            Sum { args, labels } => {
                let args = self.fetch_all(&args, stack, map)?;
                self.mk_sum(&args, &labels, loc)
            },
            Prod { args, labels } => {
                let args = self.fetch_all(&args, stack, map)?;
                self.mk_prod(&args, &labels, loc)
            },
            Record { args, labels } => {
                let args = self.fetch_all(&args, stack, map)?;
                self.mk_record(&args, &labels, loc)
            },
            Ext { val, label } => {
                let val = self.fetch(val, stack, map)?;
                self.mk_ext(val, label, loc)
            },
            Ins { val, label, elem } => {
                let new_val = self.fetch(val, stack, map);
                let new_elem = self.fetch(elem, stack, map);
                let (val, elem) = (new_val?, new_elem?);
                self.mk_ins(val, label, elem, loc)
            },
            Inj { label, arg } => {
                let new_ty = self.fetch(self.ty(node), stack, map);
                let new_arg = self.fetch(arg, stack, map);
                let (ty, arg) = (new_ty?, new_arg?);
                self.mk_inj(ty, label, arg, loc)
            },
            Arrow { var, codom } => {
                let new_var = self.fetch(var, stack, map);
                let new_codom = self.fetch(codom, stack, map);
                let (var, codom) = (new_var?, new_codom?);
                self.mk_arrow(var, codom, loc)
            },
            Abs { var, body } => {
                let new_var = self.fetch(var, stack, map);
                let new_body = self.fetch(body, stack, map);
                let (var, body) = (new_var?, new_body?);
                self.mk_abs(var, body, loc)
            },
            App { left, right } => {
                let new_left = self.fetch(left, stack, map);
                let new_right = self.fetch(right, stack, map);
                let (left, right) = (new_left?, new_right?);
                self.mk_app(left, right, loc)
            },
            Let { vars : bound, vals, body } => {
                // Bound variables cannot be replacement targets (no
                // shadowing), so only the values and the body move.
                let new_body = self.fetch(body, stack, map);
                let new_vals = self.fetch_all(&vals, stack, map);
                let (body, vals) = (new_body?, new_vals?);
                self.mk_let(&bound, &vals, body, loc)
            },
            Letrec { vars : bound, vals, body } => {
                let new_body = self.fetch(body, stack, map);
                let new_vals = self.fetch_all(&vals, stack, map);
                let (body, vals) = (new_body?, new_vals?);
                self.mk_letrec(&bound, &vals, body, loc)
            },
            Match { pats, vals, arg } => {
                let new_arg = self.fetch(arg, stack, map);
                let new_vals = self.fetch_all(&vals, stack, map);
                let (arg, vals) = (new_arg?, new_vals?);
                self.mk_match(&pats, &vals, arg, loc)
            },
            Uni | Star | Nat | Int | Float | Undef => node,
        };

        map.insert(node, new_node);
        Some(new_node)
    }

    /// Weak head reduction to a fixed point : beta-steps with the
    /// argument reduced first, and let/letrec elimination by substituting
    /// reduced values into the body. Terminates iff the term terminates;
    /// callers arrange to only hand it well-typed input.
    pub fn reduce(&mut self, node : NodeId) -> NodeId {
        let mut node = node;
        loop {
            let old_node = node;
            loop {
                let (var, body, right) = match self.kind(node) {
                    App { left, right } => match self.kind(*left) {
                        Abs { var, body } => (*var, *body, *right),
                        _ => break
                    },
                    _ => break
                };
                let arg = self.reduce(right);
                node = self.replace_var(body, var, arg);
            }
            loop {
                let (vars, vals, body) = match self.kind(node).clone() {
                    Let { vars, vals, body } | Letrec { vars, vals, body } => (vars, vals, body),
                    _ => break
                };
                let mut reduced = Vec::with_capacity(vals.len());
                for &val in vals.iter() {
                    reduced.push(self.reduce(val));
                }
                node = self.replace_vars(body, &vars, &reduced);
            }
            if node == old_node {
                return node
            }
        }
    }
}

#[cfg(test)]
mod subst_tests {
    use crate::log::Loc;
    use crate::module::Module;
    use crate::node::{ Lit, NodeId, NodeKind };

    fn var(m : &mut Module, name : &str, ty : NodeId) -> NodeId {
        let label = m.new_label(name, Loc::default());
        m.mk_var(ty, Some(label), Loc::default())
    }

    fn nat_lit(m : &mut Module, value : u64) -> NodeId {
        let nat = m.mk_nat();
        m.mk_lit(nat, Lit::Int(value), Loc::default())
    }

    #[test]
    fn empty_substitution_is_identity() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let a = m.new_label("a", Loc::default());
        let record = m.mk_record(&[x], &[a], Loc::default());
        assert_eq!(m.replace_vars(record, &[], &[]), record);
    }

    #[test]
    fn substitution_rebuilds_only_the_dependent_path() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);
        let one = nat_lit(&mut m, 1);
        let a = m.new_label("a", Loc::default());
        let b = m.new_label("b", Loc::default());

        let record = m.mk_record(&[x, y], &[a, b], Loc::default());
        let replaced = m.replace_var(record, x, one);
        let expected = m.mk_record(&[one, y], &[a, b], Loc::default());
        assert_eq!(replaced, expected);

        // A term without the variable is shared, not copied.
        let unrelated = m.mk_record(&[y], &[a], Loc::default());
        assert_eq!(m.replace_var(unrelated, x, one), unrelated);

        // Once replaced, a second replacement of the same variable is a no-op.
        let two = nat_lit(&mut m, 2);
        assert_eq!(m.replace_var(replaced, x, two), replaced);
    }

    #[test]
    fn simultaneous_substitution() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);
        let one = nat_lit(&mut m, 1);
        let two = nat_lit(&mut m, 2);
        let a = m.new_label("a", Loc::default());
        let b = m.new_label("b", Loc::default());

        let record = m.mk_record(&[x, y], &[a, b], Loc::default());
        let replaced = m.replace_vars(record, &[x, y], &[one, two]);
        let expected = m.mk_record(&[one, two], &[a, b], Loc::default());
        assert_eq!(replaced, expected);
    }

    #[test]
    fn beta_reduction() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let three = nat_lit(&mut m, 3);

        let id_fn = m.mk_abs(x, x, Loc::default());
        let app = m.mk_app(id_fn, three, Loc::default());
        assert_eq!(m.ty(app), nat);
        let reduced = m.reduce(app);
        assert_eq!(reduced, three);

        // Reduction is idempotent on terminating terms.
        assert_eq!(m.reduce(reduced), reduced);
        assert_eq!(m.reduce(app), three);
    }

    #[test]
    fn let_reduction_substitutes_bindings() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let one = nat_lit(&mut m, 1);

        let l = m.mk_let(&[x], &[one], x, Loc::default());
        match m.kind(l) {
            NodeKind::Let {..} => {},
            _ => panic!("expected the let to survive simplification")
        }
        assert_eq!(m.reduce(l), one);
    }

    #[test]
    fn reduction_happens_under_nested_redexes() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);
        let five = nat_lit(&mut m, 5);

        // (\x. x) applied through a let-bound argument.
        let id_fn = m.mk_abs(x, x, Loc::default());
        let inner_app = m.mk_app(id_fn, y, Loc::default());
        let l = m.mk_let(&[y], &[five], inner_app, Loc::default());
        assert_eq!(m.reduce(l), five);
    }

    #[test]
    fn variable_types_are_rewritten() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let star = m.mk_star();
        let bitwidth = m.mk_unbound_var(nat, Loc::default());
        let family_ty = m.mk_arrow(bitwidth, star, Loc::default());
        let p = var(&mut m, "P", family_ty);
        let n = var(&mut m, "n", nat);
        let pn = m.mk_app(p, n, Loc::default());
        let witness = var(&mut m, "w", pn);

        let three = nat_lit(&mut m, 3);
        let rewritten = m.replace_var(witness, n, three);
        let expected_ty = m.mk_app(p, three, Loc::default());
        assert_eq!(m.ty(rewritten), expected_ty);
        match m.kind(rewritten) {
            NodeKind::Var { label } => assert!(label.is_some()),
            _ => panic!("expected a variable")
        }
    }
}
