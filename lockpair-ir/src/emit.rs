#![forbid(unsafe_code)]

use crate::{
    AssignLhs, AttrValue, Attributes, Block, Cmd, CmdKind, Decl, Expr, Implementation, Procedure,
    Program, Terminator, Type, Variable,
};

/// Renders the program as Boogie-style text, declarations in program order.
pub fn emit_program(program: &Program) -> String {
    let mut out = String::new();
    for d in &program.decls {
        match d {
            Decl::Global(g) => {
                out.push_str(&format!("var {}{}: {};\n\n", attrs_prefix(&g.attrs), g.name, emit_type(&g.ty)));
            }
            Decl::Constant(c) => {
                let unique = if c.unique { "unique " } else { "" };
                out.push_str(&format!(
                    "const {unique}{}{}: {};\n\n",
                    attrs_prefix(&c.attrs),
                    c.name,
                    emit_type(&c.ty)
                ));
            }
            Decl::Procedure(p) => emit_procedure(&mut out, p),
            Decl::Implementation(i) => emit_implementation(&mut out, i),
        }
    }
    out
}

pub fn emit_type(ty: &Type) -> String {
    match ty {
        Type::Bool => "bool".to_string(),
        Type::Int => "int".to_string(),
        Type::Ref => "ref".to_string(),
        Type::Map { key, value } => format!("[{}]{}", emit_type(key), emit_type(value)),
    }
}

pub fn emit_expr(e: &Expr) -> String {
    match e {
        Expr::Bool(b) => b.to_string(),
        Expr::Int(n) => n.to_string(),
        Expr::Ident(name) => name.clone(),
        Expr::Not(inner) => format!("!{}", emit_operand(inner)),
        Expr::Binary { op, lhs, rhs } => {
            format!("{} {} {}", emit_operand(lhs), op.symbol(), emit_operand(rhs))
        }
        Expr::Select { map, index } => format!("{}[{}]", emit_operand(map), emit_expr(index)),
        Expr::Ite { cond, then, els } => format!(
            "(if {} then {} else {})",
            emit_expr(cond),
            emit_expr(then),
            emit_expr(els)
        ),
    }
}

fn emit_operand(e: &Expr) -> String {
    match e {
        Expr::Binary { .. } => format!("({})", emit_expr(e)),
        _ => emit_expr(e),
    }
}

fn emit_attr_value(v: &AttrValue) -> String {
    match v {
        AttrValue::Int(n) => n.to_string(),
        AttrValue::Str(s) => format!("\"{s}\""),
        AttrValue::Bool(b) => b.to_string(),
        AttrValue::Expr(e) => emit_expr(e),
    }
}

fn attrs_prefix(attrs: &Attributes) -> String {
    attrs
        .iter()
        .map(|a| {
            if a.params.is_empty() {
                format!("{{:{}}} ", a.key)
            } else {
                let params: Vec<String> = a.params.iter().map(emit_attr_value).collect();
                format!("{{:{} {}}} ", a.key, params.join(", "))
            }
        })
        .collect()
}

fn emit_vars(vars: &[Variable]) -> String {
    vars.iter()
        .map(|v| format!("{}: {}", v.name, emit_type(&v.ty)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn emit_returns(vars: &[Variable]) -> String {
    if vars.is_empty() {
        String::new()
    } else {
        format!(" returns ({})", emit_vars(vars))
    }
}

fn emit_procedure(out: &mut String, p: &Procedure) {
    out.push_str(&format!(
        "procedure {}{}({}){};\n",
        attrs_prefix(&p.attrs),
        p.name,
        emit_vars(&p.params),
        emit_returns(&p.returns)
    ));
    if !p.modifies.is_empty() {
        out.push_str(&format!("  modifies {};\n", p.modifies.join(", ")));
    }
    for r in &p.requires {
        out.push_str(&format!("  requires {};\n", emit_expr(r)));
    }
    for e in &p.ensures {
        out.push_str(&format!("  ensures {};\n", emit_expr(e)));
    }
    out.push('\n');
}

fn emit_implementation(out: &mut String, i: &Implementation) {
    out.push_str(&format!(
        "implementation {}{}({}){}\n{{\n",
        attrs_prefix(&i.attrs),
        i.name,
        emit_vars(&i.params),
        emit_returns(&i.returns)
    ));
    for l in &i.locals {
        out.push_str(&format!("  var {}: {};\n", l.name, emit_type(&l.ty)));
    }
    if !i.locals.is_empty() {
        out.push('\n');
    }
    for b in &i.blocks {
        emit_block(out, b);
    }
    out.push_str("}\n\n");
}

fn emit_block(out: &mut String, b: &Block) {
    out.push_str(&format!("  {}:\n", b.label));
    for c in &b.cmds {
        out.push_str(&format!("    {}\n", emit_cmd(c)));
    }
    match &b.term {
        Terminator::Return => out.push_str("    return;\n"),
        Terminator::Goto(targets) => out.push_str(&format!("    goto {};\n", targets.join(", "))),
    }
    out.push('\n');
}

pub fn emit_cmd(c: &Cmd) -> String {
    let attrs = attrs_prefix(&c.attrs);
    match &c.kind {
        CmdKind::Assign { lhs, rhs } => {
            let lhs: Vec<String> = lhs
                .iter()
                .map(|l| match l {
                    AssignLhs::Simple(name) => name.clone(),
                    AssignLhs::Map { map, index } => format!("{map}[{}]", emit_expr(index)),
                })
                .collect();
            let rhs: Vec<String> = rhs.iter().map(emit_expr).collect();
            format!("{} := {};", lhs.join(", "), rhs.join(", "))
        }
        CmdKind::Call {
            callee, args, outs, ..
        } => {
            let args: Vec<String> = args.iter().map(emit_expr).collect();
            let outs = if outs.is_empty() {
                String::new()
            } else {
                format!("{} := ", outs.join(", "))
            };
            format!("call {attrs}{outs}{callee}({});", args.join(", "))
        }
        CmdKind::Assume(e) => format!("assume {attrs}{};", emit_expr(e)),
        CmdKind::Assert(e) => format!("assert {attrs}{};", emit_expr(e)),
        CmdKind::Havoc(names) => format!("havoc {};", names.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Constant, GlobalVar, Hook};

    #[test]
    fn procedure_and_implementation_layout() {
        let mut p = Program::new();
        p.add_decl(GlobalVar::new("g", Type::Bool));
        let params = vec![Variable::new("p", Type::Ref)];
        let mut proc = Procedure::new("f", params.clone());
        proc.add_modifies("g");
        proc.add_requires(Expr::not(Expr::ident("g")));
        p.add_decl(proc);
        let mut imp = Implementation::new(
            "f",
            params,
            vec![
                Block::new("bb0", vec![Cmd::assume(Expr::Bool(true))], Terminator::Goto(vec!["bb1".into()])),
                Block::new("bb1", Vec::new(), Terminator::Return),
            ],
        );
        imp.locals.push(Variable::new("x", Type::Int));
        p.add_decl(imp);

        let expected = "var g: bool;\n\n\
            procedure f(p: ref);\n  modifies g;\n  requires !g;\n\n\
            implementation f(p: ref)\n{\n  var x: int;\n\n\
            \x20 bb0:\n    assume true;\n    goto bb1;\n\n\
            \x20 bb1:\n    return;\n\n}\n\n";
        assert_eq!(emit_program(&p), expected);
    }

    #[test]
    fn attributes_print_in_insertion_order() {
        let c = Cmd::marker(
            Attributes::new()
                .with("column", vec![AttrValue::Int(5)])
                .with("line", vec![AttrValue::Int(12)])
                .with("captureState", vec![AttrValue::Str("log_state_0".into())]),
        );
        assert_eq!(
            emit_cmd(&c),
            "assume {:column 5} {:line 12} {:captureState \"log_state_0\"} true;"
        );
    }

    #[test]
    fn emits_map_store_and_hooked_call() {
        let store = Cmd::assign(
            AssignLhs::Map {
                map: "$M.0".into(),
                index: Expr::ident("p"),
            },
            Expr::Int(1),
        );
        let call = Cmd::hooked_call("_UPDATE_CLS_$probe", vec![Expr::ident("l"), Expr::Bool(true)], Hook::UpdateLockset);
        assert_eq!(emit_cmd(&store), "$M.0[p] := 1;");
        assert_eq!(emit_cmd(&call), "call _UPDATE_CLS_$probe(l, true);");
    }

    #[test]
    fn emits_existential_constant() {
        let mut p = Program::new();
        let mut c = Constant::new("_b$probe$0", Type::Bool);
        c.attrs.set("existential", vec![AttrValue::Bool(true)]);
        p.add_decl(c);
        p.add_decl(GlobalVar::new("g", Type::Map { key: Box::new(Type::Ref), value: Box::new(Type::Int) }));
        let text = emit_program(&p);
        assert!(text.contains("const {:existential true} _b$probe$0: bool;"));
        assert!(text.contains("var g: [ref]int;"));
    }
}
