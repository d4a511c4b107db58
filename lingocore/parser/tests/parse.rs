use lingo_ast::{BinOp, ExprKind, LiteralValue, Scope, StmtKind, TheId};
use lingo_parser::parse;

#[test]
fn handler_with_bare_and_parenthesised_params() {
    let root = parse("on greet who, times\n  put who\nend\n").expect("parse");
    assert_eq!(root.handlers[0].name, "greet");
    assert_eq!(root.handlers[0].params, vec!["who".to_string(), "times".to_string()]);

    let root = parse("on greet(who, times)\n  put who\nend\n").expect("parse");
    assert_eq!(root.handlers[0].params, vec!["who".to_string(), "times".to_string()]);
}

#[test]
fn assignment_introduces_locals_in_first_seen_order() {
    let root = parse("on main\n  x = 1\n  y = x + 2\n  x = y\nend\n").expect("parse");
    let h = &root.handlers[0];
    assert_eq!(h.locals, vec!["x".to_string(), "y".to_string()]);
    match &h.body[0].kind {
        StmtKind::Assign { lvalue, .. } => match &lvalue.kind {
            ExprKind::Identifier { name, scope } => {
                assert_eq!(name, "x");
                assert_eq!(*scope, Scope::Local);
            }
            other => panic!("expected identifier lvalue, got {:?}", other),
        },
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn property_shadows_everything() {
    let src = "property name\non getName\n  return name\nend\n";
    let root = parse(src).expect("parse");
    assert_eq!(root.properties, vec!["name".to_string()]);
    match &root.handlers[0].body[0].kind {
        StmtKind::Return(Some(e)) => match &e.kind {
            ExprKind::Identifier { name, scope } => {
                assert_eq!(name, "name");
                assert_eq!(*scope, Scope::Property);
            }
            other => panic!("expected identifier, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn undeclared_read_is_rejected_unless_called() {
    let err = parse("on main\n  put zzz\nend\n").unwrap_err();
    assert!(format!("{}", err).contains("undeclared identifier 'zzz'"));

    // any bare word can be a handler when the next token is '('
    parse("on main\n  put zzz()\nend\n").expect("dynamic call target parses");
}

#[test]
fn duplicate_declarations_are_parse_errors() {
    assert!(parse("property a, a\non f\nend\n").is_err());
    assert!(parse("global g, g\non f\nend\n").is_err());
    assert!(parse("on f x, x\nend\n").is_err());
    assert!(parse("on f\n  global h, h\nend\n").is_err());
}

#[test]
fn bare_call_statement_takes_unparenthesised_arguments() {
    let root = parse("on main\n  greet \"world\", 2\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Expr(e) => match &e.kind {
            ExprKind::Call { callee, args } => {
                assert!(matches!(&callee.kind, ExprKind::Identifier { name, .. } if name == "greet"));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }

    // the first comma is optional
    let root = parse("on main\n  greet, \"world\", 2\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Expr(e) => match &e.kind {
            ExprKind::Call { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn bare_word_alone_is_a_zero_argument_call() {
    let root = parse("on main\n  cleanup\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Expr(e) => match &e.kind {
            ExprKind::Call { args, .. } => assert!(args.is_empty()),
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn multiplicative_binds_tighter_than_additive() {
    let root = parse("on main\n  x = 3 + 4 * 2\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Assign { rvalue, .. } => match &rvalue.kind {
            ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(&rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected addition on top, got {:?}", other),
        },
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn comparison_is_loosest() {
    let root = parse("on main\n  x = 1 + 2 = 3\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Assign { rvalue, .. } => {
            assert!(matches!(&rvalue.kind, ExprKind::Binary { op: BinOp::Eq, .. }));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn unary_minus_folds_into_numeric_literals() {
    let root = parse("on main\n  x = -5\n  y = -2.5\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Assign { rvalue, .. } => {
            assert!(matches!(&rvalue.kind, ExprKind::Literal(LiteralValue::Int(-5))));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
    match &root.handlers[0].body[1].kind {
        StmtKind::Assign { rvalue, .. } => match &rvalue.kind {
            ExprKind::Literal(LiteralValue::Float(f)) => assert_eq!(*f, -2.5),
            other => panic!("expected float literal, got {:?}", other),
        },
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn inline_if_with_else() {
    let root = parse("on main\n  if 1 then put \"y\" else put \"n\"\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::If { branches, else_body } => {
            assert_eq!(branches.len(), 1);
            assert_eq!(branches[0].body.len(), 1);
            assert!(else_body.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn block_if_chains_else_if_branches() {
    let src = "on main\n  if 1 then\n    put \"a\"\n  else if 0 then\n    put \"b\"\n  else\n    put \"c\"\n  end if\nend\n";
    let root = parse(src).expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::If { branches, else_body } => {
            assert_eq!(branches.len(), 2);
            assert!(else_body.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn repeat_header_discards_trailing_tokens() {
    let src = "on main\n  i = 1\n  repeat while i < 3 then what even\n    i = i + 1\n  end repeat\nend\n";
    let root = parse(src).expect("parse");
    assert!(matches!(&root.handlers[0].body[1].kind, StmtKind::RepeatWhile { .. }));
}

#[test]
fn repeat_forms_parse() {
    let src = "on main\n  repeat with i = 1 to 3\n    put i\n  end repeat\n  repeat with i = 3 down to 1\n    put i\n  end repeat\n  repeat with x in [1, 2]\n    put x\n  end repeat\nend\n";
    let root = parse(src).expect("parse");
    let h = &root.handlers[0];
    assert!(matches!(&h.body[0].kind, StmtKind::RepeatTo { down: false, .. }));
    assert!(matches!(&h.body[1].kind, StmtKind::RepeatTo { down: true, .. }));
    assert!(matches!(&h.body[2].kind, StmtKind::RepeatIn { .. }));
    // the iterators became locals
    assert_eq!(h.locals, vec!["i".to_string(), "x".to_string()]);
}

#[test]
fn exit_and_next_require_a_loop_keyword() {
    let src = "on main\n  repeat with i = 1 to 3\n    if i = 2 then next repeat\n    exit repeat\n  end repeat\nend\n";
    parse(src).expect("parse");

    // bare `exit` leaves the handler
    let root = parse("on main\n  exit\nend\n").expect("parse");
    assert!(matches!(&root.handlers[0].body[0].kind, StmtKind::Return(None)));
}

#[test]
fn put_after_and_before_take_lvalue_targets() {
    let src = "on main\n  s = \"a\"\n  put \"b\" after s\n  put \"c\" before s\nend\n";
    let root = parse(src).expect("parse");
    let h = &root.handlers[0];
    assert!(matches!(&h.body[1].kind, StmtKind::PutOn { before: false, .. }));
    assert!(matches!(&h.body[2].kind, StmtKind::PutOn { before: true, .. }));

    assert!(parse("on main\n  put \"b\" after 3\nend\n").is_err());
}

#[test]
fn case_statement_parses_clauses_and_otherwise() {
    let src = "on check x\n  case x of\n    1: put \"one\"\n    2, 3:\n      put \"several\"\n    otherwise:\n      put \"other\"\n  end case\nend\n";
    let root = parse(src).expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Case { clauses, otherwise, .. } => {
            assert_eq!(clauses.len(), 2);
            assert_eq!(clauses[0].literals.len(), 1);
            assert_eq!(clauses[1].literals.len(), 2);
            assert_eq!(clauses[1].body.len(), 1);
            assert!(otherwise.is_some());
        }
        other => panic!("expected case, got {:?}", other),
    }
}

#[test]
fn the_expressions_resolve_to_builtin_ids() {
    let root = parse("on main\n  put the milliseconds\nend\n").expect("parse");
    match &root.handlers[0].body[0].kind {
        StmtKind::Put(e) => assert!(matches!(&e.kind, ExprKind::The(TheId::Milliseconds))),
        other => panic!("expected put, got {:?}", other),
    }
    assert!(parse("on main\n  put the bogus\nend\n").is_err());
}

#[test]
fn builtin_identifiers_become_literals() {
    let root = parse("on main\n  x = true\n  y = void\nend\n").expect("parse");
    let h = &root.handlers[0];
    match &h.body[0].kind {
        StmtKind::Assign { rvalue, .. } => {
            assert!(matches!(&rvalue.kind, ExprKind::Literal(LiteralValue::Int(1))));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
    match &h.body[1].kind {
        StmtKind::Assign { rvalue, .. } => {
            assert!(matches!(&rvalue.kind, ExprKind::Literal(LiteralValue::Void)));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn list_and_property_list_literals() {
    let root = parse("on main\n  a = [1, 2, 3]\n  b = [#k: 1]\n  c = []\n  d = [:]\nend\n")
        .expect("parse");
    let h = &root.handlers[0];
    let rv = |i: usize| match &h.body[i].kind {
        StmtKind::Assign { rvalue, .. } => &rvalue.kind,
        other => panic!("expected assignment, got {:?}", other),
    };
    assert!(matches!(rv(0), ExprKind::List(items) if items.len() == 3));
    assert!(matches!(rv(1), ExprKind::PropList(pairs) if pairs.len() == 1));
    assert!(matches!(rv(2), ExprKind::List(items) if items.is_empty()));
    assert!(matches!(rv(3), ExprKind::PropList(pairs) if pairs.is_empty()));
}

#[test]
fn lvalue_assignment_through_dot_and_index() {
    let src = "on main\n  d = [:]\n  d.k = 1\n  d[#x] = 2\nend\n";
    let root = parse(src).expect("parse");
    let h = &root.handlers[0];
    match &h.body[1].kind {
        StmtKind::Assign { lvalue, .. } => assert!(matches!(&lvalue.kind, ExprKind::Dot { .. })),
        other => panic!("expected assignment, got {:?}", other),
    }
    match &h.body[2].kind {
        StmtKind::Assign { lvalue, .. } => {
            assert!(matches!(&lvalue.kind, ExprKind::Index { to: None, .. }));
        }
        other => panic!("expected assignment, got {:?}", other),
    }

    assert!(parse("on main\n  1 + 2 = 3 + 4\nend\n").is_err());
}

#[test]
fn every_identifier_leaves_with_a_scope() {
    // globals declared at script scope and per handler both resolve
    let src = "global total\non main\n  global seen\n  total = 1\n  seen = 2\nend\n";
    let root = parse(src).expect("parse");
    let h = &root.handlers[0];
    for stmt in &h.body {
        if let StmtKind::Assign { lvalue, .. } = &stmt.kind {
            assert!(matches!(&lvalue.kind, ExprKind::Identifier { scope: Scope::Global, .. }));
        }
    }
    assert!(h.locals.is_empty());
}
