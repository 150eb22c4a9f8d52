use hashbrown::{ HashMap, HashSet };

use crate::module::{ Module, find_label };
use crate::node::{ LabelId, NodeId, NodeKind, VarSetId };

use NodeKind::*;

/// Outcome of matching one pattern against a value at simplification
/// time. `Match` means the pattern statically matches and the recorded
/// bindings may be substituted; `NoMatch` means the constructors
/// conflict; `MayMatch` means nothing can be decided yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MatchRes {
    NoMatch,
    Match,
    MayMatch,
}

impl Module {
    /// Algebraic canonicalization, invoked exactly once per new node at
    /// interning time. Returns an equivalent (possibly identical) node;
    /// anything it builds goes back through the constructors and is
    /// therefore itself canonical.
    pub(crate) fn simplify(&mut self, node : NodeId) -> NodeId {
        match self.kind(node).clone() {
            Ins { val, label, elem } => self.simplify_ins(node, val, label, elem),
            Ext { val, label } => self.simplify_ext(node, val, label),
            Record { args, labels } => self.simplify_record(node, &args, &labels),
            Let { vars, vals, body } => self.simplify_let(node, &vars, &vals, body),
            Letrec { vars, vals, body } => self.simplify_letrec(node, &vars, &vals, body),
            Match { pats, vals, arg } => self.simplify_match(node, &pats, &vals, arg),
            Arrow { var, codom } => self.simplify_arrow(node, var, codom),
            Abs { var, body } => self.simplify_abs(node, var, body),
            Top | Bot => self.simplify_top_bot(node),
            _ => node
        }
    }

    /// `Ext(Record{.., l = e, ..}, l) => e`; extraction out of an
    /// injection yields the payload on the matching label and bottom on
    /// any other.
    fn simplify_ext(&mut self, node : NodeId, val : NodeId, label : LabelId) -> NodeId {
        match self.kind(val).clone() {
            Record { args, labels } => {
                match find_label(&labels, label) {
                    Some(index) => args[index],
                    None => panic!("extraction label is not a field of the record")
                }
            },
            Inj { label : inj_label, arg } => {
                if inj_label == label {
                    arg
                } else {
                    let ty = self.ty(node);
                    let loc = self.loc(node);
                    self.mk_bot(ty, loc)
                }
            },
            _ => node
        }
    }

    /// Insertion into a record rebuilds the record; insertion at a sum
    /// type is an injection.
    fn simplify_ins(&mut self, node : NodeId, val : NodeId, label : LabelId, elem : NodeId) -> NodeId {
        if let Record { args, labels } = self.kind(val).clone() {
            let mut args = args.into_vec();
            match find_label(&labels, label) {
                Some(index) => args[index] = elem,
                None => panic!("insertion label is not a field of the record")
            }
            let loc = self.loc(node);
            return self.mk_record(&args, &labels, loc)
        }
        if let Sum {..} = self.kind(self.ty(node)) {
            let ty = self.ty(node);
            let loc = self.loc(node);
            return self.mk_inj(ty, label, elem, loc)
        }
        node
    }

    /// Eta for records : a record made of in-order extractions from one
    /// source of the same type is that source.
    fn simplify_record(&mut self, node : NodeId, args : &[NodeId], labels : &[LabelId]) -> NodeId {
        let mut from = None;
        for (&arg, &label) in args.iter().zip(labels.iter()) {
            match self.kind(arg) {
                Ext { val, label : ext_label }
                    if *ext_label == label && from.map_or(true, |f| f == *val) => {
                    from = Some(*val);
                },
                _ => {
                    from = None;
                    break
                }
            }
        }
        match from {
            Some(from) if self.ty(from) == self.ty(node) => from,
            _ => node
        }
    }

    /// If the codomain does not depend on the variable, demote it to an
    /// unbound placeholder so non-dependent arrows share one shape.
    fn simplify_arrow(&mut self, node : NodeId, var : NodeId, codom : NodeId) -> NodeId {
        if !self.is_unbound_var(var) && !self.contains_var(self.free_vars(codom), var) {
            let var_ty = self.ty(var);
            let var_loc = self.loc(var);
            let unbound = self.mk_unbound_var(var_ty, var_loc);
            let loc = self.loc(node);
            return self.mk_arrow(unbound, codom, loc)
        }
        node
    }

    fn simplify_abs(&mut self, node : NodeId, var : NodeId, body : NodeId) -> NodeId {
        if !self.is_unbound_var(var) && !self.contains_var(self.free_vars(body), var) {
            let var_ty = self.ty(var);
            let var_loc = self.loc(var);
            let unbound = self.mk_unbound_var(var_ty, var_loc);
            let loc = self.loc(node);
            return self.mk_abs(unbound, body, loc)
        }
        // Eta : \x. f x => f
        if let App { left, right } = self.kind(body).clone() {
            if right == var && self.ty(left) == self.ty(node) {
                return left
            }
        }
        node
    }

    /// Top and bottom of a product type distribute into a record of
    /// tops/bottoms of the field types.
    fn simplify_top_bot(&mut self, node : NodeId) -> NodeId {
        if let Prod { args, labels } = self.kind(self.ty(node)).clone() {
            let loc = self.loc(node);
            let is_top = match self.kind(node) { Top => true, _ => false };
            let mut elems = Vec::with_capacity(args.len());
            for &arg in args.iter() {
                elems.push(if is_top {
                    self.mk_top(arg, loc.clone())
                } else {
                    self.mk_bot(arg, loc.clone())
                });
            }
            return self.mk_record(&elems, &labels, loc)
        }
        node
    }

    // Let -------------------------------------------------------------------------

    fn simplify_let(&mut self, node : NodeId, vars : &[NodeId], vals : &[NodeId], body : NodeId) -> NodeId {
        if vars.is_empty() {
            return body
        }

        if let Let { vars : inner_vars, vals : inner_vals, body : inner_body } = self.kind(body).clone() {
            if let Some(res) = self.try_merge_let(node, vars, vals, body, &inner_vars, &inner_vals, inner_body) {
                return res
            }
        }

        let mut kept_vars = Vec::with_capacity(vars.len());
        let mut kept_vals = Vec::with_capacity(vals.len());
        let mut new_body = body;
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            // Only keep variables referenced in the body; forward the
            // ones whose value is itself a variable.
            if self.contains_var(self.free_vars(new_body), var) {
                if let Var {..} = self.kind(val) {
                    new_body = self.replace_var(new_body, var, val);
                } else {
                    kept_vars.push(var);
                    kept_vals.push(val);
                }
            }
        }

        if kept_vars.len() != vars.len() {
            let loc = self.loc(node);
            self.mk_let(&kept_vars, &kept_vals, new_body, loc)
        } else {
            node
        }
    }

    /// Two nested lets merge when the inner one's values do not reference
    /// the outer one's variables; bindings that are referenced stay in
    /// the outer let.
    fn try_merge_let(
        &mut self,
        node : NodeId, vars : &[NodeId], vals : &[NodeId],
        body : NodeId, inner_vars : &[NodeId], inner_vals : &[NodeId], inner_body : NodeId) -> Option<NodeId>
    {
        let mut push_down_vars = Vec::with_capacity(vars.len() + inner_vars.len());
        let mut push_down_vals = Vec::with_capacity(vals.len() + inner_vals.len());
        let mut kept_vars = Vec::with_capacity(vars.len());
        let mut kept_vals = Vec::with_capacity(vals.len());
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            let movable = inner_vals.iter().all(|v| !self.contains_var(self.free_vars(*v), var));
            if movable {
                push_down_vars.push(var);
                push_down_vals.push(val);
            } else {
                kept_vars.push(var);
                kept_vals.push(val);
            }
        }
        if kept_vars.len() == vars.len() {
            return None
        }
        push_down_vars.extend_from_slice(inner_vars);
        push_down_vals.extend_from_slice(inner_vals);
        let inner_loc = self.loc(body);
        let merged = self.mk_let(&push_down_vars, &push_down_vals, inner_body, inner_loc);
        let loc = self.loc(node);
        Some(self.mk_let(&kept_vars, &kept_vals, merged, loc))
    }

    // Letrec ----------------------------------------------------------------------

    /// Decompose a recursive binding group along the strongly connected
    /// components of its use-relation : non-recursive bindings become
    /// plain lets, each cycle becomes its own letrec, and bindings the
    /// body cannot reach are dropped. A letrec that is one big cycle is
    /// returned unchanged.
    fn simplify_letrec(&mut self, node : NodeId, vars : &[NodeId], vals : &[NodeId], body : NodeId) -> NodeId {
        let letrec_vars = self.new_vars(vars);

        // For every bound variable, record its value and the set of
        // letrec variables whose definitions use it.
        let mut bindings : HashMap<NodeId, (NodeId, VarSetId)> = HashMap::with_capacity(vars.len());
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            bindings.insert(var, (val, self.empty_vars()));
        }
        for (&var, &val) in vars.iter().zip(vals.iter()) {
            let val_free = self.free_vars(val);
            let used = self.intr_vars(val_free, letrec_vars);
            let user = self.new_vars(&[var]);
            for &used_var in self.vars(used).to_vec().iter() {
                let uses = bindings[&used_var].1;
                let uses = self.union_vars(uses, user);
                if let Some(binding) = bindings.get_mut(&used_var) {
                    binding.1 = uses;
                }
            }
        }

        // Close the use-relation transitively (fixpoint).
        loop {
            let mut todo = false;
            for &var in vars.iter() {
                let uses = bindings[&var].1;
                let mut acc = uses;
                for &user in self.vars(uses).to_vec().iter() {
                    let user_uses = bindings[&user].1;
                    acc = self.union_vars(acc, user_uses);
                }
                if acc != uses {
                    todo = true;
                    if let Some(binding) = bindings.get_mut(&var) {
                        binding.1 = acc;
                    }
                }
            }
            if !todo {
                break
            }
        }

        // The variables needed (transitively) to compute the body.
        let body_free = self.free_vars(body);
        let mut reachable = self.intr_vars(body_free, letrec_vars);
        loop {
            let old = reachable;
            for &var in self.vars(old).to_vec().iter() {
                let val_free = self.free_vars(bindings[&var].0);
                let contrib = self.intr_vars(val_free, letrec_vars);
                reachable = self.union_vars(reachable, contrib);
            }
            if reachable == old {
                break
            }
        }

        let mut done : HashSet<NodeId> = HashSet::with_capacity(vars.len());
        self.split_letrec_vars(body, node, vars.len(), reachable, &mut done, &bindings)
    }

    fn split_letrec_vars(
        &mut self, mut body : NodeId, letrec : NodeId, letrec_len : usize,
        set : VarSetId, done : &mut HashSet<NodeId>,
        bindings : &HashMap<NodeId, (NodeId, VarSetId)>) -> NodeId
    {
        for &var in self.vars(set).to_vec().iter() {
            body = self.split_letrec_var(body, letrec, letrec_len, var, done, bindings);
        }
        body
    }

    fn split_letrec_var(
        &mut self, mut body : NodeId, letrec : NodeId, letrec_len : usize,
        var : NodeId, done : &mut HashSet<NodeId>,
        bindings : &HashMap<NodeId, (NodeId, VarSetId)>) -> NodeId
    {
        if !done.insert(var) {
            return body
        }
        let (val, uses) = bindings[&var];
        if self.contains_var(uses, var) {
            // The binding is part of a cycle : collect the members that
            // are mutually reachable with it.
            let mut rec_vars = vec![var];
            let mut rec_vals = vec![val];
            for &other in self.vars(uses).to_vec().iter() {
                if other == var {
                    continue
                }
                let (other_val, other_uses) = bindings[&other];
                if self.contains_var(other_uses, var) && done.insert(other) {
                    rec_vars.push(other);
                    rec_vals.push(other_val);
                }
            }
            if rec_vars.len() != letrec_len {
                // Dependencies first, then the cycle wraps around them.
                body = self.split_letrec_vars(body, letrec, letrec_len, uses, done, bindings);
                let loc = self.loc(letrec);
                body = self.mk_letrec(&rec_vars, &rec_vals, body, loc);
            } else {
                body = letrec;
            }
        } else {
            body = self.split_letrec_vars(body, letrec, letrec_len, uses, done, bindings);
            let loc = self.loc(letrec);
            body = self.mk_let(&[var], &[val], body, loc);
        }
        body
    }

    // Match -----------------------------------------------------------------------

    fn try_match(
        &mut self, pat : NodeId, arg : NodeId,
        bind_vars : &mut Vec<NodeId>, bind_vals : &mut Vec<NodeId>) -> MatchRes
    {
        match self.kind(pat).clone() {
            NodeKind::Lit(_) => {
                if arg == pat {
                    MatchRes::Match
                } else if let NodeKind::Lit(_) = self.kind(arg) {
                    MatchRes::NoMatch
                } else {
                    MatchRes::MayMatch
                }
            },
            Var {..} => {
                if !self.is_unbound_var(pat) {
                    bind_vars.push(pat);
                    bind_vals.push(arg);
                }
                MatchRes::Match
            },
            Record { args, labels } => {
                for (&sub_pat, &label) in args.iter().zip(labels.iter()) {
                    let loc = self.loc(sub_pat);
                    let elem = self.mk_ext(arg, label, loc);
                    match self.try_match(sub_pat, elem, bind_vars, bind_vals) {
                        MatchRes::NoMatch => return MatchRes::NoMatch,
                        MatchRes::MayMatch => return MatchRes::MayMatch,
                        MatchRes::Match => {}
                    }
                }
                MatchRes::Match
            },
            Inj { label, arg : pat_arg } => {
                if let Inj { label : arg_label, arg : arg_arg } = self.kind(arg).clone() {
                    if arg_label != label {
                        MatchRes::NoMatch
                    } else {
                        self.try_match(pat_arg, arg_arg, bind_vars, bind_vals)
                    }
                } else {
                    MatchRes::MayMatch
                }
            },
            _ => {
                debug_assert!(false, "invalid pattern");
                MatchRes::MayMatch
            }
        }
    }

    /// Try to execute the match : the first arm that statically matches
    /// wins, a full set of conflicts collapses to bottom, and arms after
    /// the first trivial pattern are unreachable and dropped.
    fn simplify_match(&mut self, node : NodeId, pats : &[NodeId], vals : &[NodeId], arg : NodeId) -> NodeId {
        let mut bind_vars = Vec::with_capacity(16);
        let mut bind_vals = Vec::with_capacity(16);
        for (i, (&pat, &val)) in pats.iter().zip(vals.iter()).enumerate() {
            bind_vars.clear();
            bind_vals.clear();
            match self.try_match(pat, arg, &mut bind_vars, &mut bind_vals) {
                MatchRes::NoMatch => {
                    if i + 1 == pats.len() {
                        let ty = self.ty(node);
                        let loc = self.loc(node);
                        return self.mk_bot(ty, loc)
                    }
                },
                MatchRes::Match => {
                    return self.replace_vars(val, &bind_vars, &bind_vals)
                },
                MatchRes::MayMatch => break
            }
        }

        for i in 1..pats.len() {
            if self.is_trivial_pat(pats[i - 1]) {
                let loc = self.loc(node);
                return self.mk_match(&pats[..i], &vals[..i], arg, loc)
            }
        }
        node
    }
}

#[cfg(test)]
mod simplify_tests {
    use crate::log::Loc;
    use crate::module::Module;
    use crate::node::{ LabelId, Lit, NodeId, NodeKind };

    fn var(m : &mut Module, name : &str, ty : NodeId) -> NodeId {
        let label = m.new_label(name, Loc::default());
        m.mk_var(ty, Some(label), Loc::default())
    }

    fn nat_lit(m : &mut Module, value : u64) -> NodeId {
        let nat = m.mk_nat();
        m.mk_lit(nat, Lit::Int(value), Loc::default())
    }

    fn pair_labels(m : &mut Module) -> (LabelId, LabelId) {
        (m.new_label("a", Loc::default()), m.new_label("b", Loc::default()))
    }

    #[test]
    fn unused_let_bindings_are_dropped() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);
        let one = nat_lit(&mut m, 1);
        let two = nat_lit(&mut m, 2);

        // let x = 1 in let y = 2 in x
        let inner = m.mk_let(&[y], &[two], x, Loc::default());
        // The inner binding is unused, so the inner let collapses to x.
        assert_eq!(inner, x);
        let outer = m.mk_let(&[x], &[one], inner, Loc::default());
        let expected = m.mk_let(&[x], &[one], x, Loc::default());
        assert_eq!(outer, expected);
        match m.kind(outer) {
            NodeKind::Let { vars, .. } => assert_eq!(vars.len(), 1),
            _ => panic!("expected a let")
        }
    }

    #[test]
    fn variable_valued_bindings_are_forwarded() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);
        let one = nat_lit(&mut m, 1);

        // let x = 1 in let y = x in y  =>  let x = 1 in x
        let inner = m.mk_let(&[y], &[x], y, Loc::default());
        assert_eq!(inner, x);
        let outer = m.mk_let(&[x], &[one], inner, Loc::default());
        let expected = m.mk_let(&[x], &[one], x, Loc::default());
        assert_eq!(outer, expected);
    }

    #[test]
    fn nested_lets_merge() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let x = var(&mut m, "x", nat);
        let y = var(&mut m, "y", nat);
        let one = nat_lit(&mut m, 1);
        let two = nat_lit(&mut m, 2);

        let body = m.mk_record(&[x, y], &[a, b], Loc::default());
        let inner = m.mk_let(&[y], &[two], body, Loc::default());
        let outer = m.mk_let(&[x], &[one], inner, Loc::default());
        let expected = m.mk_let(&[x, y], &[one, two], body, Loc::default());
        assert_eq!(outer, expected);
        match m.kind(outer) {
            NodeKind::Let { vars, .. } => assert_eq!(vars.len(), 2),
            _ => panic!("expected a merged let")
        }
    }

    #[test]
    fn extraction_rules() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let one = nat_lit(&mut m, 1);
        let two = nat_lit(&mut m, 2);

        let record = m.mk_record(&[one, two], &[a, b], Loc::default());
        assert_eq!(m.mk_ext(record, a, Loc::default()), one);
        assert_eq!(m.mk_ext(record, b, Loc::default()), two);

        let sum = m.mk_sum(&[nat, nat], &[a, b], Loc::default());
        let inj = m.mk_inj(sum, a, one, Loc::default());
        assert_eq!(m.mk_ext(inj, a, Loc::default()), one);
        let mismatch = m.mk_ext(inj, b, Loc::default());
        match m.kind(mismatch) {
            NodeKind::Bot => assert_eq!(m.ty(mismatch), nat),
            _ => panic!("expected bottom for a conflicting extraction")
        }
    }

    #[test]
    fn insertion_rules() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let one = nat_lit(&mut m, 1);
        let two = nat_lit(&mut m, 2);
        let five = nat_lit(&mut m, 5);

        let record = m.mk_record(&[one, two], &[a, b], Loc::default());
        let inserted = m.mk_ins(record, a, five, Loc::default());
        let expected = m.mk_record(&[five, two], &[a, b], Loc::default());
        assert_eq!(inserted, expected);

        let sum = m.mk_sum(&[nat, nat], &[a, b], Loc::default());
        let s = var(&mut m, "s", sum);
        let injected = m.mk_ins(s, a, five, Loc::default());
        let expected = m.mk_inj(sum, a, five, Loc::default());
        assert_eq!(injected, expected);
    }

    #[test]
    fn record_of_extractions_collapses() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let prod = m.mk_prod(&[nat, nat], &[a, b], Loc::default());
        let v = var(&mut m, "v", prod);

        let ext_a = m.mk_ext(v, a, Loc::default());
        let ext_b = m.mk_ext(v, b, Loc::default());
        let record = m.mk_record(&[ext_a, ext_b], &[a, b], Loc::default());
        assert_eq!(record, v);

        // Out-of-order extractions do not collapse.
        let swapped = m.mk_record(&[ext_b, ext_a], &[a, b], Loc::default());
        assert_ne!(swapped, v);
    }

    #[test]
    fn arrows_demote_unused_parameters() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let x = var(&mut m, "x", nat);
        let arrow = m.mk_arrow(x, nat, Loc::default());
        match m.kind(arrow) {
            NodeKind::Arrow { var, .. } => assert!(m.is_unbound_var(*var)),
            _ => panic!("expected an arrow")
        }
    }

    #[test]
    fn abs_eta_reduces() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let bitwidth = m.mk_unbound_var(nat, Loc::default());
        let nat_to_nat = m.mk_arrow(bitwidth, nat, Loc::default());
        let f = var(&mut m, "f", nat_to_nat);
        let x = var(&mut m, "x", nat);
        let fx = m.mk_app(f, x, Loc::default());
        let eta = m.mk_abs(x, fx, Loc::default());
        assert_eq!(eta, f);
    }

    #[test]
    fn top_and_bot_distribute_over_products() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let prod = m.mk_prod(&[nat, nat], &[a, b], Loc::default());

        let top = m.mk_top(prod, Loc::default());
        match m.kind(top).clone() {
            NodeKind::Record { args, .. } => {
                assert_eq!(args.len(), 2);
                for arg in args.iter() {
                    match m.kind(*arg) {
                        NodeKind::Top => assert_eq!(m.ty(*arg), nat),
                        _ => panic!("expected a top field")
                    }
                }
            },
            _ => panic!("expected a record of tops")
        }

        let bot = m.mk_bot(prod, Loc::default());
        match m.kind(bot) {
            NodeKind::Record {..} => {},
            _ => panic!("expected a record of bottoms")
        }
    }

    #[test]
    fn match_selects_statically_known_arm() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let sum = m.mk_sum(&[nat, nat], &[a, b], Loc::default());
        let one = nat_lit(&mut m, 1);
        let zero = nat_lit(&mut m, 0);

        let arg = m.mk_inj(sum, a, one, Loc::default());
        let v = var(&mut m, "v", nat);
        let w = var(&mut m, "w", nat);
        let pat_a = m.mk_inj(sum, a, v, Loc::default());
        let pat_b = m.mk_inj(sum, b, w, Loc::default());
        let res = m.mk_match(&[pat_a, pat_b], &[v, zero], arg, Loc::default());
        assert_eq!(res, one);
    }

    #[test]
    fn match_with_no_matching_arm_is_bottom() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let sum = m.mk_sum(&[nat, nat], &[a, b], Loc::default());
        let one = nat_lit(&mut m, 1);
        let five = nat_lit(&mut m, 5);

        let arg = m.mk_inj(sum, a, one, Loc::default());
        let w = var(&mut m, "w", nat);
        let pat_b = m.mk_inj(sum, b, w, Loc::default());
        let res = m.mk_match(&[pat_b], &[five], arg, Loc::default());
        match m.kind(res) {
            NodeKind::Bot => assert_eq!(m.ty(res), nat),
            _ => panic!("expected bottom when no arm can match")
        }
    }

    #[test]
    fn arms_after_a_trivial_pattern_are_dropped() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let sum = m.mk_sum(&[nat, nat], &[a, b], Loc::default());
        let s = var(&mut m, "s", sum);
        let seven = nat_lit(&mut m, 7);

        let v = var(&mut m, "v", nat);
        let u = var(&mut m, "u", nat);
        let w = var(&mut m, "w", sum);
        let pat_a = m.mk_inj(sum, a, v, Loc::default());
        let pat_b = m.mk_inj(sum, b, u, Loc::default());
        let res = m.mk_match(&[pat_a, w, pat_b], &[v, seven, u], s, Loc::default());
        match m.kind(res) {
            NodeKind::Match { pats, .. } => assert_eq!(pats.len(), 2),
            _ => panic!("expected a truncated match")
        }
    }

    #[test]
    fn letrec_splits_into_reachable_components() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let bitwidth = m.mk_unbound_var(nat, Loc::default());
        let nat_to_nat = m.mk_arrow(bitwidth, nat, Loc::default());
        let f = var(&mut m, "f", nat_to_nat);
        let g = var(&mut m, "g", nat);
        let x = var(&mut m, "x", nat);
        let zero = nat_lit(&mut m, 0);

        // f = \x. f x (eta-reduces to f itself, keeping the cycle), g = 0.
        let fx = m.mk_app(f, x, Loc::default());
        let f_val = m.mk_abs(x, fx, Loc::default());
        assert_eq!(f_val, f);

        // The body only needs g, so f is dropped and g becomes a plain let.
        let letrec = m.mk_letrec(&[f, g], &[f_val, zero], g, Loc::default());
        let expected = m.mk_let(&[g], &[zero], g, Loc::default());
        assert_eq!(letrec, expected);
    }

    #[test]
    fn fully_cyclic_letrec_is_kept() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let bitwidth = m.mk_unbound_var(nat, Loc::default());
        let nat_to_nat = m.mk_arrow(bitwidth, nat, Loc::default());
        let f = var(&mut m, "f", nat_to_nat);
        let x = var(&mut m, "x", nat);
        let three = nat_lit(&mut m, 3);

        let fx = m.mk_app(f, x, Loc::default());
        let f_val = m.mk_abs(x, fx, Loc::default());
        let f3 = m.mk_app(f, three, Loc::default());
        let letrec = m.mk_letrec(&[f], &[f_val], f3, Loc::default());
        match m.kind(letrec) {
            NodeKind::Letrec { vars, .. } => assert_eq!(vars.len(), 1),
            _ => panic!("expected the cycle to survive")
        }
    }

    #[test]
    fn rebuilding_simplified_nodes_is_stable() {
        let mut m = Module::new();
        let nat = m.mk_nat();
        let (a, b) = pair_labels(&mut m);
        let one = nat_lit(&mut m, 1);
        let two = nat_lit(&mut m, 2);
        let record = m.mk_record(&[one, two], &[a, b], Loc::default());
        let ext = m.mk_ext(record, a, Loc::default());
        let x = var(&mut m, "x", nat);
        let l = m.mk_let(&[x], &[one], x, Loc::default());

        for node in [record, ext, l].iter() {
            assert_eq!(m.rebuild(*node), *node);
        }
    }
}
