//! Exemplar Parser
//!
//! Converts snippet source into [`Program`] trees with source location tracking.
//! The parser is purely syntactic; scoping and runtime checks happen in the interpreter.

use std::rc::Rc;

use once_cell::sync::Lazy;
use pest::{
    error::{Error, ErrorVariant, InputLocation},
    iterators::Pair,
    pratt_parser::{Assoc, Op, PrattParser},
    Parser,
};
use pest_derive::Parser;

use crate::errors::{
    to_source_span, ErrorKind, ErrorReporting, ExemplarError, SourceContext, ValidationContext,
};
use crate::runtime::format_number;
use crate::syntax::*;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct SnippetParser;

type BuildResult<T> = Result<T, ExemplarError>;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::op_nullish, Assoc::Left))
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::infix(Rule::op_strict_eq, Assoc::Left)
            | Op::infix(Rule::op_strict_ne, Assoc::Left)
            | Op::infix(Rule::op_eq, Assoc::Left)
            | Op::infix(Rule::op_ne, Assoc::Left))
        .op(Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left)
            | Op::infix(Rule::op_instanceof, Assoc::Left)
            | Op::infix(Rule::op_in, Assoc::Left))
        .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left))
        .op(Op::infix(Rule::op_exp, Assoc::Right))
});

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse snippet source into a program.
pub fn parse(source_text: &str, source_context: SourceContext) -> BuildResult<Program> {
    let source = &source_context;
    let mut pairs = SnippetParser::parse(Rule::program, source_text)
        .map_err(|e| convert_parse_error(e, source))?;

    let Some(program) = pairs.next() else {
        return Ok(Program {
            body: Vec::new(),
            var_names: Vec::new(),
        });
    };

    let body = program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| build_stmt(p, source))
        .collect::<BuildResult<Vec<_>>>()?;
    let var_names = collect_var_names(&body);

    Ok(Program { body, var_names })
}

// ============================================================================
// STATEMENT BUILDERS
// ============================================================================

fn build_stmt(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Stmt> {
    let span = get_span(&pair);
    let rule = pair.as_rule();

    let kind = match rule {
        Rule::block => StmtKind::Block(build_stmts(pair, source)?),

        Rule::unsupported => {
            return Err(make_error(
                source,
                ErrorKind::UnsupportedSyntax {
                    feature: format!("`{}`", pair.as_str().trim()),
                },
                span,
            ))
        }

        Rule::var_decl => StmtKind::VarDecl(build_var_decl(pair, source)?),

        Rule::function_decl => StmtKind::Function(build_function(pair, false, source)?),

        Rule::class_decl => StmtKind::Class(build_class(pair, source)?),

        Rule::if_stmt => {
            let mut inner = significant(pair);
            let test = build_expr(next_pair(&mut inner, "condition", span, source)?, source)?;
            let consequent = build_stmt(next_pair(&mut inner, "statement", span, source)?, source)?;
            let alternate = inner
                .next()
                .map(|p| build_stmt(p, source))
                .transpose()?
                .map(Box::new);
            StmtKind::If {
                test,
                consequent: Box::new(consequent),
                alternate,
            }
        }

        Rule::for_stmt => build_for(pair, source)?,

        Rule::for_each_stmt => {
            let mut inner = significant(pair);
            let binding = build_for_binding(next_pair(&mut inner, "binding", span, source)?, source)?;
            let kind = match next_pair(&mut inner, "`of` or `in`", span, source)?.as_str() {
                "in" => ForEachKind::In,
                _ => ForEachKind::Of,
            };
            let iterable = build_expr(next_pair(&mut inner, "iterable", span, source)?, source)?;
            let body = build_stmt(next_pair(&mut inner, "loop body", span, source)?, source)?;
            StmtKind::ForEach {
                kind,
                binding,
                iterable,
                body: Box::new(body),
            }
        }

        Rule::while_stmt => {
            let mut inner = significant(pair);
            let test = build_expr(next_pair(&mut inner, "condition", span, source)?, source)?;
            let body = build_stmt(next_pair(&mut inner, "loop body", span, source)?, source)?;
            StmtKind::While {
                test,
                body: Box::new(body),
            }
        }

        Rule::do_while_stmt => {
            let mut inner = significant(pair);
            let body = build_stmt(next_pair(&mut inner, "loop body", span, source)?, source)?;
            let test = build_expr(next_pair(&mut inner, "condition", span, source)?, source)?;
            StmtKind::DoWhile {
                body: Box::new(body),
                test,
            }
        }

        Rule::switch_stmt => {
            let mut inner = significant(pair);
            let discriminant =
                build_expr(next_pair(&mut inner, "switch value", span, source)?, source)?;
            let cases = inner
                .map(|case| build_switch_case(case, source))
                .collect::<BuildResult<Vec<_>>>()?;
            if cases.iter().filter(|c| c.test.is_none()).count() > 1 {
                return Err(source_error(source, "More than one default clause in switch statement", span));
            }
            StmtKind::Switch {
                discriminant,
                cases,
            }
        }

        Rule::try_stmt => build_try(pair, source)?,

        Rule::return_stmt => {
            let value = significant(pair)
                .next()
                .map(|p| build_expr(p, source))
                .transpose()?;
            StmtKind::Return(value)
        }

        Rule::break_stmt => StmtKind::Break,

        Rule::continue_stmt => StmtKind::Continue,

        Rule::throw_stmt => {
            let mut inner = significant(pair);
            StmtKind::Throw(build_expr(next_pair(&mut inner, "expression", span, source)?, source)?)
        }

        Rule::empty_stmt => StmtKind::Empty,

        Rule::expr_stmt => {
            let mut inner = significant(pair);
            StmtKind::Expr(build_expr(next_pair(&mut inner, "expression", span, source)?, source)?)
        }

        rule => {
            return Err(source.malformed(&format!("statement ({:?})", rule), to_source_span(span)))
        }
    };

    Ok(Stmt { kind, span })
}

fn build_stmts(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Vec<Stmt>> {
    significant(pair).map(|p| build_stmt(p, source)).collect()
}

fn build_var_decl(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<VarDecl> {
    let span = get_span(&pair);
    let mut inner = significant(pair);
    let kind = decl_kind(next_pair(&mut inner, "declaration kind", span, source)?.as_str());

    let mut declarators = Vec::new();
    for declarator in inner {
        let declarator_span = get_span(&declarator);
        let mut parts = significant(declarator);
        let target = build_pattern(next_pair(&mut parts, "binding", declarator_span, source)?, source)?;
        let init = parts.next().map(|p| build_expr(p, source)).transpose()?;

        if init.is_none() && kind == DeclKind::Const {
            return Err(source_error(source, "Missing initializer in const declaration", declarator_span));
        }
        if init.is_none() && !matches!(target, Pattern::Ident(..)) {
            return Err(source_error(source, "Missing initializer in destructuring declaration", declarator_span));
        }

        let init = match (&target, init) {
            (Pattern::Ident(name, _), Some(init)) => Some(name_anonymous(init, name)),
            (_, init) => init,
        };
        declarators.push(Declarator { target, init });
    }

    Ok(VarDecl { kind, declarators })
}

fn build_for(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<StmtKind> {
    let span = get_span(&pair);
    let mut init = None;
    let mut test = None;
    let mut update = None;
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::for_init => {
                let inner = first_inner(part, "loop initializer", source)?;
                init = Some(if inner.as_rule() == Rule::var_decl {
                    ForInit::VarDecl(build_var_decl(inner, source)?)
                } else {
                    ForInit::Expr(build_expr(inner, source)?)
                });
            }
            Rule::for_test => test = Some(build_expr(first_inner(part, "loop condition", source)?, source)?),
            Rule::for_update => update = Some(build_expr(first_inner(part, "loop update", source)?, source)?),
            _ => body = Some(build_stmt(part, source)?),
        }
    }

    let body = body.ok_or_else(|| source.malformed("for loop without a body", to_source_span(span)))?;
    Ok(StmtKind::For {
        init,
        test,
        update,
        body: Box::new(body),
    })
}

fn build_for_binding(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<ForBinding> {
    let span = get_span(&pair);
    let mut kind = None;
    let mut target = None;
    for part in significant(pair) {
        if part.as_rule() == Rule::var_kind {
            kind = Some(decl_kind(part.as_str()));
        } else {
            target = Some(build_pattern(part, source)?);
        }
    }
    let target = target.ok_or_else(|| source.malformed("loop binding", to_source_span(span)))?;
    Ok(ForBinding { kind, target })
}

fn build_switch_case(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<SwitchCase> {
    let mut inner = significant(pair);
    let test = match inner.next() {
        Some(label) if label.as_rule() == Rule::default_label => None,
        Some(expr) => Some(build_expr(expr, source)?),
        None => None,
    };
    let body = inner
        .map(|p| build_stmt(p, source))
        .collect::<BuildResult<Vec<_>>>()?;
    Ok(SwitchCase { test, body })
}

fn build_try(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<StmtKind> {
    let span = get_span(&pair);
    let mut block = None;
    let mut handler = None;
    let mut finalizer = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::block => block = Some(build_stmts(part, source)?),
            Rule::catch_clause => {
                let mut param = None;
                let mut body = Vec::new();
                for piece in significant(part) {
                    if piece.as_rule() == Rule::block {
                        body = build_stmts(piece, source)?;
                    } else {
                        param = Some(build_pattern(piece, source)?);
                    }
                }
                handler = Some(CatchClause { param, body });
            }
            Rule::finally_clause => {
                let inner = first_inner(part, "finally block", source)?;
                finalizer = Some(build_stmts(inner, source)?);
            }
            _ => {}
        }
    }

    if handler.is_none() && finalizer.is_none() {
        return Err(source_error(source, "Missing catch or finally after try", span));
    }

    Ok(StmtKind::Try {
        block: block.unwrap_or_default(),
        handler,
        finalizer,
    })
}

// ============================================================================
// FUNCTION AND CLASS BUILDERS
// ============================================================================

/// Builds `function_decl`, `function_expr`, `method_def`-style pairs made of an optional
/// name, a parameter list and a body.
fn build_function(pair: Pair<Rule>, is_arrow: bool, source: &SourceContext) -> BuildResult<Rc<FunctionDef>> {
    let span = get_span(&pair);
    let mut name = None;
    let mut params = Vec::new();
    let mut rest = None;
    let mut body = FunctionBody::Block(Vec::new());

    for part in significant(pair) {
        match part.as_rule() {
            Rule::identifier if is_arrow => {
                let param_span = get_span(&part);
                params.push(PatternElement {
                    pattern: Pattern::Ident(Rc::from(part.as_str()), param_span),
                    default: None,
                });
            }
            Rule::identifier => name = Some(Rc::from(part.as_str())),
            Rule::params => (params, rest) = build_params(part, source)?,
            Rule::function_body => body = FunctionBody::Block(build_stmts(part, source)?),
            _ => body = FunctionBody::Expr(Box::new(build_expr(part, source)?)),
        }
    }

    Ok(Rc::new(make_function(name, params, rest, body, is_arrow, span)))
}

fn make_function(
    name: Option<Name>,
    params: Vec<PatternElement>,
    rest: Option<Pattern>,
    body: FunctionBody,
    is_arrow: bool,
    span: Span,
) -> FunctionDef {
    let var_names = match &body {
        FunctionBody::Block(stmts) => collect_var_names(stmts),
        FunctionBody::Expr(_) => Vec::new(),
    };
    FunctionDef {
        name,
        params,
        rest,
        body,
        is_arrow,
        var_names,
        span,
    }
}

fn build_params(
    pair: Pair<Rule>,
    source: &SourceContext,
) -> BuildResult<(Vec<PatternElement>, Option<Pattern>)> {
    let mut params = Vec::new();
    let mut rest = None;

    for param in significant(pair) {
        let span = get_span(&param);
        if rest.is_some() {
            return Err(source_error(source, "Rest parameter must be last formal parameter", span));
        }
        match param.as_rule() {
            Rule::pattern_rest => {
                let target = first_inner(param, "rest binding", source)?;
                rest = Some(build_pattern(target, source)?);
            }
            _ => params.push(build_binding_element(param, source)?),
        }
    }

    Ok((params, rest))
}

fn build_method(
    key: PropKey,
    params: Pair<Rule>,
    body: Pair<Rule>,
    span: Span,
    source: &SourceContext,
) -> BuildResult<Rc<FunctionDef>> {
    let (params, rest) = build_params(params, source)?;
    let body = FunctionBody::Block(build_stmts(body, source)?);
    let name = match &key {
        PropKey::Static(name) => Some(name.clone()),
        PropKey::Computed(_) => None,
    };
    Ok(Rc::new(make_function(name, params, rest, body, false, span)))
}

fn build_class(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Rc<ClassDef>> {
    let span = get_span(&pair);
    let mut name: Option<Name> = None;
    let mut parent = None;
    let mut constructor = None;
    let mut methods = Vec::new();
    let mut fields = Vec::new();

    for part in significant(pair) {
        match part.as_rule() {
            Rule::identifier => name = Some(Rc::from(part.as_str())),
            Rule::class_heritage => {
                parent = Some(build_expr(first_inner(part, "parent class", source)?, source)?)
            }
            Rule::class_body => {
                for member in significant(part) {
                    let member_span = get_span(&member);
                    let rule = member.as_rule();
                    let mut pieces = significant(member).peekable();
                    let is_static = pieces
                        .peek()
                        .is_some_and(|p| p.as_rule() == Rule::static_marker);
                    if is_static {
                        pieces.next();
                    }
                    let key = build_property_key(next_pair(&mut pieces, "member name", member_span, source)?, source)?;

                    if rule == Rule::class_field {
                        let value = pieces
                            .next()
                            .map(|p| build_expr(p, source))
                            .transpose()?
                            .map(|value| match &key {
                                PropKey::Static(field) => name_anonymous(value, field),
                                PropKey::Computed(_) => value,
                            });
                        fields.push(ClassField {
                            key,
                            is_static,
                            value,
                        });
                        continue;
                    }

                    let params = next_pair(&mut pieces, "parameters", member_span, source)?;
                    let body = next_pair(&mut pieces, "method body", member_span, source)?;
                    let is_constructor =
                        !is_static && matches!(&key, PropKey::Static(k) if &**k == "constructor");
                    let func = build_method(key.clone(), params, body, member_span, source)?;

                    if is_constructor {
                        if constructor.is_some() {
                            return Err(source_error(source, "A class may only have one constructor", member_span));
                        }
                        constructor = Some(func);
                    } else {
                        methods.push(ClassMethod {
                            key,
                            is_static,
                            func,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let constructor = match constructor {
        Some(ctor) => rename_function(ctor, name.clone()),
        None => Rc::new(default_constructor(name.clone(), parent.is_some(), span)),
    };

    Ok(Rc::new(ClassDef {
        name,
        parent,
        constructor,
        methods,
        fields,
        span,
    }))
}

/// `constructor(...args) { super(...args) }` for derived classes, `constructor() {}` otherwise.
fn default_constructor(name: Option<Name>, derived: bool, span: Span) -> FunctionDef {
    if !derived {
        return make_function(name, Vec::new(), None, FunctionBody::Block(Vec::new()), false, span);
    }
    let args: Name = Rc::from("args");
    let super_call = Expr {
        kind: ExprKind::SuperCall(vec![ArrayElement::Spread(Expr {
            kind: ExprKind::Ident(args.clone()),
            span,
        })]),
        span,
    };
    let body = vec![Stmt {
        kind: StmtKind::Expr(super_call),
        span,
    }];
    make_function(
        name,
        Vec::new(),
        Some(Pattern::Ident(args, span)),
        FunctionBody::Block(body),
        false,
        span,
    )
}

fn rename_function(func: Rc<FunctionDef>, name: Option<Name>) -> Rc<FunctionDef> {
    let mut def = Rc::try_unwrap(func).unwrap_or_else(|shared| (*shared).clone());
    def.name = name;
    Rc::new(def)
}

/// Gives `const f = () => {}` and friends the name of their binding.
fn name_anonymous(expr: Expr, name: &Name) -> Expr {
    match expr.kind {
        ExprKind::Function(def) if def.name.is_none() => Expr {
            kind: ExprKind::Function(rename_function(def, Some(name.clone()))),
            span: expr.span,
        },
        ExprKind::Class(def) if def.name.is_none() => {
            let mut class = Rc::try_unwrap(def).unwrap_or_else(|shared| (*shared).clone());
            class.name = Some(name.clone());
            class.constructor = rename_function(class.constructor, Some(name.clone()));
            Expr {
                kind: ExprKind::Class(Rc::new(class)),
                span: expr.span,
            }
        }
        kind => Expr {
            kind,
            span: expr.span,
        },
    }
}

// ============================================================================
// PATTERN BUILDERS
// ============================================================================

fn build_pattern(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Pattern> {
    let span = get_span(&pair);
    match pair.as_rule() {
        Rule::identifier => Ok(Pattern::Ident(Rc::from(pair.as_str()), span)),

        Rule::array_pattern => {
            let mut elements = Vec::new();
            let mut rest = None;
            for slot in significant(pair) {
                let slot_span = get_span(&slot);
                if rest.is_some() {
                    return Err(source_error(source, "Rest element must be last element", slot_span));
                }
                match slot.as_rule() {
                    Rule::pattern_hole => elements.push(None),
                    Rule::pattern_rest => {
                        let target = first_inner(slot, "rest binding", source)?;
                        rest = Some(Box::new(build_pattern(target, source)?));
                    }
                    _ => elements.push(Some(build_binding_element(slot, source)?)),
                }
            }
            Ok(Pattern::Array {
                elements,
                rest,
                span,
            })
        }

        Rule::object_pattern => {
            let mut props = Vec::new();
            let mut rest = None;
            for prop in significant(pair) {
                let prop_span = get_span(&prop);
                if rest.is_some() {
                    return Err(source_error(source, "Rest element must be last element", prop_span));
                }
                match prop.as_rule() {
                    Rule::pattern_rest => {
                        let target = first_inner(prop, "rest binding", source)?;
                        if target.as_rule() != Rule::identifier {
                            return Err(source_error(source, "`...` must be followed by an identifier in declaration contexts", prop_span));
                        }
                        rest = Some(Rc::from(target.as_str()));
                    }
                    Rule::pattern_pair => {
                        let mut parts = significant(prop);
                        let key = build_property_key(next_pair(&mut parts, "property name", prop_span, source)?, source)?;
                        let value = build_binding_element(next_pair(&mut parts, "binding", prop_span, source)?, source)?;
                        props.push(ObjectPatternProp { key, value });
                    }
                    _ => {
                        let mut parts = significant(prop);
                        let ident = next_pair(&mut parts, "binding", prop_span, source)?;
                        let name: Name = Rc::from(ident.as_str());
                        let default = parts
                            .next()
                            .map(|p| build_expr(p, source))
                            .transpose()?
                            .map(|value| name_anonymous(value, &name));
                        props.push(ObjectPatternProp {
                            key: PropKey::Static(name.clone()),
                            value: PatternElement {
                                pattern: Pattern::Ident(name, get_span(&ident)),
                                default,
                            },
                        });
                    }
                }
            }
            Ok(Pattern::Object { props, rest, span })
        }

        rule => Err(source.malformed(&format!("binding pattern ({:?})", rule), to_source_span(span))),
    }
}

fn build_binding_element(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<PatternElement> {
    let span = get_span(&pair);
    let mut parts = significant(pair);
    let pattern = build_pattern(next_pair(&mut parts, "binding", span, source)?, source)?;
    let default = parts.next().map(|p| build_expr(p, source)).transpose()?;
    let default = match (&pattern, default) {
        (Pattern::Ident(name, _), Some(value)) => Some(name_anonymous(value, name)),
        (_, default) => default,
    };
    Ok(PatternElement { pattern, default })
}

fn build_property_key(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<PropKey> {
    let pair = match pair.as_rule() {
        Rule::property_key => first_inner(pair, "property name", source)?,
        _ => pair,
    };
    let span = get_span(&pair);
    match pair.as_rule() {
        Rule::property_name | Rule::identifier => Ok(PropKey::Static(Rc::from(pair.as_str()))),
        Rule::string => Ok(PropKey::Static(Rc::from(build_string(pair, source)?.as_str()))),
        Rule::number => {
            let value = parse_number(pair.as_str(), span, source)?;
            Ok(PropKey::Static(Rc::from(format_number(value).as_str())))
        }
        Rule::computed_key => {
            let expr = build_expr(first_inner(pair, "computed key", source)?, source)?;
            Ok(PropKey::Computed(Box::new(expr)))
        }
        rule => Err(source.malformed(&format!("property key ({:?})", rule), to_source_span(span))),
    }
}

// ============================================================================
// EXPRESSION BUILDERS
// ============================================================================

fn build_expr(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Expr> {
    let span = get_span(&pair);

    let kind = match pair.as_rule() {
        Rule::number => ExprKind::Number(parse_number(pair.as_str(), span, source)?),

        Rule::string => ExprKind::String(Rc::from(build_string(pair, source)?.as_str())),

        Rule::template => build_template(pair, source)?,

        Rule::boolean => ExprKind::Bool(pair.as_str() == "true"),

        Rule::null_lit => ExprKind::Null,

        Rule::this_expr => ExprKind::This,

        Rule::identifier => ExprKind::Ident(Rc::from(pair.as_str())),

        Rule::unsupported_kw => {
            return Err(make_error(
                source,
                ErrorKind::UnsupportedSyntax {
                    feature: format!("`{}`", pair.as_str()),
                },
                span,
            ))
        }

        Rule::array_lit => ExprKind::Array(build_elements(pair, source)?),

        Rule::object_lit => ExprKind::Object(build_object(pair, source)?),

        Rule::function_expr => ExprKind::Function(build_function(pair, false, source)?),

        Rule::arrow_fn => ExprKind::Function(build_function(pair, true, source)?),

        Rule::class_expr => ExprKind::Class(build_class(pair, source)?),

        Rule::assignment => return build_assignment(pair, source),

        Rule::conditional => {
            let mut inner = pair.into_inner();
            let test = build_expr(next_pair(&mut inner, "condition", span, source)?, source)?;
            let Some(consequent) = inner.next() else {
                return Ok(test);
            };
            if consequent.as_rule() == Rule::assign_op {
                let value = next_pair(&mut inner, "assigned value", span, source)?;
                let target = expr_target(test, source)?;
                return finish_assignment(target, consequent, value, span, source);
            }
            let consequent = build_expr(consequent, source)?;
            let alternate = build_expr(next_pair(&mut inner, "`:` branch", span, source)?, source)?;
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            }
        }

        Rule::logical => return build_binary(pair, source),

        Rule::unary_expr => return build_unary(pair, source),

        Rule::postfix_expr => {
            let mut inner = pair.into_inner();
            let target = build_expr(next_pair(&mut inner, "operand", span, source)?, source)?;
            let Some(op) = inner.next() else {
                return Ok(target);
            };
            let op = if op.as_rule() == Rule::op_postinc {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            ExprKind::Update {
                op,
                prefix: false,
                target: Box::new(check_update_target(target, source)?),
            }
        }

        Rule::call_expr => return build_call_chain(pair, source),

        Rule::new_expr => {
            let mut inner = significant(pair);
            let callee = build_call_chain(next_pair(&mut inner, "constructor", span, source)?, source)?;
            let args = inner
                .next()
                .map(|p| build_elements(p, source))
                .transpose()?
                .unwrap_or_default();
            ExprKind::New {
                callee: Box::new(callee),
                args,
            }
        }

        Rule::super_call => {
            let mut inner = significant(pair);
            ExprKind::SuperCall(build_elements(next_pair(&mut inner, "arguments", span, source)?, source)?)
        }

        Rule::super_member => {
            let mut inner = significant(pair);
            ExprKind::SuperMember(Rc::from(next_pair(&mut inner, "property", span, source)?.as_str()))
        }

        rule => return Err(source.malformed(&format!("expression ({:?})", rule), to_source_span(span))),
    };

    Ok(Expr { kind, span })
}

fn build_binary(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Expr> {
    PRATT
        .map_primary(|primary| build_expr(primary, source))
        .map_infix(|lhs, op, rhs| {
            let (left, right) = (Box::new(lhs?), Box::new(rhs?));
            let span = left.span.join(right.span);
            let kind = match (logical_op(op.as_rule()), binary_op(op.as_rule())) {
                (Some(op), _) => ExprKind::Logical { op, left, right },
                (None, Some(op)) => ExprKind::Binary { op, left, right },
                (None, None) => {
                    return Err(source.malformed(
                        &format!("operator ({:?})", op.as_rule()),
                        to_source_span(span),
                    ))
                }
            };
            Ok(Expr { kind, span })
        })
        .parse(pair.into_inner())
}

fn logical_op(rule: Rule) -> Option<LogicalOp> {
    match rule {
        Rule::op_nullish => Some(LogicalOp::Nullish),
        Rule::op_or => Some(LogicalOp::Or),
        Rule::op_and => Some(LogicalOp::And),
        _ => None,
    }
}

fn binary_op(rule: Rule) -> Option<BinaryOp> {
    let op = match rule {
        Rule::op_strict_eq => BinaryOp::StrictEq,
        Rule::op_strict_ne => BinaryOp::StrictNe,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::Ne,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_le => BinaryOp::Le,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_ge => BinaryOp::Ge,
        Rule::op_instanceof => BinaryOp::InstanceOf,
        Rule::op_in => BinaryOp::In,
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        Rule::op_mod => BinaryOp::Mod,
        Rule::op_exp => BinaryOp::Exp,
        _ => return None,
    };
    Some(op)
}

fn build_unary(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Expr> {
    let span = get_span(&pair);
    let mut parts: Vec<Pair<Rule>> = pair.into_inner().collect();
    let operand = parts
        .pop()
        .ok_or_else(|| source.malformed("unary expression", to_source_span(span)))?;
    let mut expr = build_expr(operand, source)?;

    for op in parts.into_iter().rev() {
        let op_span = get_span(&op).join(expr.span);
        let kind = match op.as_rule() {
            Rule::op_preinc | Rule::op_predec => ExprKind::Update {
                op: if op.as_rule() == Rule::op_preinc {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                },
                prefix: true,
                target: Box::new(check_update_target(expr, source)?),
            },
            rule => {
                let op = match rule {
                    Rule::op_not => UnaryOp::Not,
                    Rule::op_neg => UnaryOp::Neg,
                    Rule::op_plus => UnaryOp::Plus,
                    Rule::op_typeof => UnaryOp::TypeOf,
                    Rule::op_delete => UnaryOp::Delete,
                    _ => UnaryOp::Void,
                };
                ExprKind::Unary {
                    op,
                    argument: Box::new(expr),
                }
            }
        };
        expr = Expr {
            kind,
            span: op_span,
        };
    }

    Ok(expr)
}

fn build_call_chain(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Expr> {
    let span = get_span(&pair);
    let mut inner = significant(pair);
    let mut expr = build_expr(next_pair(&mut inner, "expression", span, source)?, source)?;

    for suffix in inner {
        let suffix_span = Span::new(expr.span.start, get_span(&suffix).end);
        let rule = suffix.as_rule();
        let callee = Box::new(expr);
        let kind = match rule {
            Rule::arguments | Rule::optional_call => {
                let args_pair = if rule == Rule::optional_call {
                    first_inner(suffix, "arguments", source)?
                } else {
                    suffix
                };
                ExprKind::Call {
                    callee,
                    args: build_elements(args_pair, source)?,
                    optional: rule == Rule::optional_call,
                }
            }
            Rule::member_dot | Rule::optional_member => ExprKind::Member {
                object: callee,
                property: MemberProp::Named(Rc::from(first_inner(suffix, "property", source)?.as_str())),
                optional: rule == Rule::optional_member,
            },
            Rule::index_access | Rule::optional_index => {
                let index = build_expr(first_inner(suffix, "index", source)?, source)?;
                ExprKind::Member {
                    object: callee,
                    property: MemberProp::Computed(Box::new(index)),
                    optional: rule == Rule::optional_index,
                }
            }
            rule => {
                return Err(source.malformed(&format!("call suffix ({:?})", rule), to_source_span(suffix_span)))
            }
        };
        expr = Expr {
            kind,
            span: suffix_span,
        };
    }

    Ok(expr)
}

/// Destructuring assignment: `[a, b] = [b, a]`.
fn build_assignment(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Expr> {
    let span = get_span(&pair);
    let mut inner = pair.into_inner();
    let target = build_pattern(next_pair(&mut inner, "assignment target", span, source)?, source)?;
    let op = next_pair(&mut inner, "assignment operator", span, source)?;
    if op.as_str() != "=" {
        return Err(source_error(source, "Invalid left-hand side in assignment", target.span()));
    }
    let value = next_pair(&mut inner, "assigned value", span, source)?;
    finish_assignment(target, op, value, span, source)
}

fn expr_target(target: Expr, source: &SourceContext) -> BuildResult<Pattern> {
    match target.kind {
        ExprKind::Ident(name) => Ok(Pattern::Ident(name, target.span)),
        ExprKind::Member {
            optional: false, ..
        } => Ok(Pattern::Expr(Box::new(target))),
        _ => Err(source_error(source, "Invalid left-hand side in assignment", target.span)),
    }
}

fn finish_assignment(
    target: Pattern,
    op: Pair<Rule>,
    value: Pair<Rule>,
    span: Span,
    source: &SourceContext,
) -> BuildResult<Expr> {
    let op = match op.as_str() {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Compound(BinaryOp::Add),
        "-=" => AssignOp::Compound(BinaryOp::Sub),
        "*=" => AssignOp::Compound(BinaryOp::Mul),
        "/=" => AssignOp::Compound(BinaryOp::Div),
        "%=" => AssignOp::Compound(BinaryOp::Mod),
        "**=" => AssignOp::Compound(BinaryOp::Exp),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        _ => AssignOp::Logical(LogicalOp::And),
    };

    let value = build_expr(value, source)?;
    let value = match &target {
        Pattern::Ident(name, _) => name_anonymous(value, name),
        _ => value,
    };

    Ok(Expr {
        kind: ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        span,
    })
}

fn check_update_target(target: Expr, source: &SourceContext) -> BuildResult<Expr> {
    match &target.kind {
        ExprKind::Ident(_) | ExprKind::Member { optional: false, .. } => Ok(target),
        _ => Err(source_error(
            source,
            "Invalid left-hand side expression in update operation",
            target.span,
        )),
    }
}

/// Array literal items and call arguments share one shape.
fn build_elements(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Vec<ArrayElement>> {
    significant(pair)
        .map(|item| {
            if item.as_rule() == Rule::spread {
                let inner = first_inner(item, "spread operand", source)?;
                Ok(ArrayElement::Spread(build_expr(inner, source)?))
            } else {
                Ok(ArrayElement::Item(build_expr(item, source)?))
            }
        })
        .collect()
}

fn build_object(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<Vec<PropertyDef>> {
    let mut props = Vec::new();
    for prop in significant(pair) {
        let span = get_span(&prop);
        let def = match prop.as_rule() {
            Rule::spread => PropertyDef::Spread(build_expr(first_inner(prop, "spread operand", source)?, source)?),
            Rule::method_def => {
                let mut parts = significant(prop);
                let key = build_property_key(next_pair(&mut parts, "method name", span, source)?, source)?;
                let params = next_pair(&mut parts, "parameters", span, source)?;
                let body = next_pair(&mut parts, "method body", span, source)?;
                let func = build_method(key.clone(), params, body, span, source)?;
                PropertyDef::Method(key, func)
            }
            Rule::prop_pair => {
                let mut parts = significant(prop);
                let key = build_property_key(next_pair(&mut parts, "property name", span, source)?, source)?;
                let value = build_expr(next_pair(&mut parts, "property value", span, source)?, source)?;
                let value = match &key {
                    PropKey::Static(name) => name_anonymous(value, name),
                    PropKey::Computed(_) => value,
                };
                PropertyDef::KeyValue(key, value)
            }
            _ => {
                let ident = first_inner(prop, "property name", source)?;
                PropertyDef::Shorthand(Rc::from(ident.as_str()), span)
            }
        };
        props.push(def);
    }
    Ok(props)
}

fn build_template(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<ExprKind> {
    let mut quasis = Vec::new();
    let mut exprs = Vec::new();
    let mut current = String::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::template_chars => current.push_str(&unescape(part.as_str())),
            _ => {
                quasis.push(Rc::from(std::mem::take(&mut current).as_str()));
                exprs.push(build_expr(first_inner(part, "template expression", source)?, source)?);
            }
        }
    }
    quasis.push(Rc::from(current.as_str()));

    Ok(ExprKind::Template { quasis, exprs })
}

// ============================================================================
// LITERALS
// ============================================================================

fn build_string(pair: Pair<Rule>, source: &SourceContext) -> BuildResult<String> {
    let raw = first_inner(pair, "string contents", source)?;
    Ok(unescape(raw.as_str()))
}

fn parse_number(text: &str, span: Span, source: &SourceContext) -> BuildResult<f64> {
    let cleaned = text.replace('_', "");
    let radix = match cleaned.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0b" | "0B") => Some(2),
        Some("0o" | "0O") => Some(8),
        _ => None,
    };

    let value = match radix {
        Some(radix) => cleaned[2..].chars().try_fold(0f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
        }),
        None => cleaned.parse::<f64>().ok(),
    };

    value.ok_or_else(|| source.invalid_literal("number", text, to_source_span(span)))
}

/// Resolves backslash escapes in string and template literal contents.
fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('v') => result.push('\u{b}'),
            Some('0') => result.push('\0'),
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                push_code_point(&mut result, &hex);
            }
            Some('u') if chars.peek() == Some(&'{') => {
                chars.next();
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                push_code_point(&mut result, &hex);
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                push_code_point(&mut result, &hex);
            }
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}

fn push_code_point(out: &mut String, hex: &str) {
    let ch = u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER);
    out.push(ch);
}

// ============================================================================
// UTILITIES
// ============================================================================

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_while
            | Rule::kw_do
            | Rule::kw_switch
            | Rule::kw_case
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_return
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_throw
            | Rule::kw_function
            | Rule::kw_class
            | Rule::kw_extends
            | Rule::kw_new
            | Rule::kw_super
    )
}

/// Inner pairs of `pair` without keyword tokens.
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn first_inner<'i>(pair: Pair<'i, Rule>, element: &str, source: &SourceContext) -> BuildResult<Pair<'i, Rule>> {
    let span = get_span(&pair);
    let mut inner = significant(pair);
    next_pair(&mut inner, element, span, source)
}

fn next_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    element: &str,
    span: Span,
    source: &SourceContext,
) -> BuildResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| source.malformed(&format!("construct: missing {}", element), to_source_span(span)))
}

fn decl_kind(text: &str) -> DeclKind {
    match text {
        "const" => DeclKind::Const,
        "var" => DeclKind::Var,
        _ => DeclKind::Let,
    }
}

fn get_span(pair: &Pair<Rule>) -> Span {
    Span {
        start: pair.as_span().start(),
        end: pair.as_span().end(),
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

impl ErrorReporting for SourceContext {
    fn report(&self, kind: ErrorKind, span: miette::SourceSpan) -> ExemplarError {
        ValidationContext::new(self.clone(), "parse").report(kind, span)
    }
}

fn make_error(source: &SourceContext, kind: ErrorKind, span: Span) -> ExemplarError {
    source.report(kind, to_source_span(span))
}

/// Early errors that JavaScript engines report as plain `SyntaxError: <message>`.
fn source_error(source: &SourceContext, message: &str, span: Span) -> ExemplarError {
    make_error(
        source,
        ErrorKind::MalformedConstruct {
            construct: message.to_string(),
        },
        span,
    )
}

fn convert_parse_error(error: Error<Rule>, source: &SourceContext) -> ExemplarError {
    let start = match error.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };

    let found_char = source.content.get(start..).and_then(|rest| rest.chars().next());
    let found = match found_char {
        Some(ch) => format!("'{}'", ch),
        None => "end of input".to_string(),
    };
    let end = start + found_char.map_or(0, char::len_utf8);

    let expected = match &error.variant {
        ErrorVariant::ParsingError { positives, .. } => describe_expected(positives),
        ErrorVariant::CustomError { message } => message.clone(),
    };

    source.unexpected_token(&expected, &found, miette::SourceSpan::from(start..end))
}

fn describe_expected(positives: &[Rule]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for rule in positives {
        let name = describe_rule(*rule);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    match names.len() {
        0 => "valid syntax".to_string(),
        1..=3 => names.join(" or "),
        _ => format!("{} or {}", names[..2].join(", "), "another token"),
    }
}

fn describe_rule(rule: Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of input",
        Rule::identifier | Rule::property_name => "identifier",
        Rule::number | Rule::string | Rule::template | Rule::boolean | Rule::null_lit => "literal",
        Rule::arguments | Rule::params => "'('",
        Rule::block | Rule::function_body | Rule::class_body => "'{'",
        Rule::assign_op => "'='",
        Rule::array_pattern | Rule::object_pattern => "binding pattern",
        Rule::member_dot | Rule::index_access => "member access",
        Rule::expr_stmt | Rule::var_decl | Rule::if_stmt | Rule::for_stmt | Rule::while_stmt => {
            "statement"
        }
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Program {
        match parse(text, SourceContext::from_file("test.js", text)) {
            Ok(program) => program,
            Err(e) => panic!("failed to parse {:?}: {}", text, e),
        }
    }

    fn parse_err(text: &str) -> ExemplarError {
        match parse(text, SourceContext::from_file("test.js", text)) {
            Ok(_) => panic!("expected {:?} to be rejected", text),
            Err(e) => e,
        }
    }

    fn only_expr(program: &Program) -> &Expr {
        match &program.body[..] {
            [Stmt {
                kind: StmtKind::Expr(expr),
                ..
            }] => expr,
            other => panic!("expected a single expression statement, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_has_no_statements() {
        assert!(parse_ok("").body.is_empty());
        assert!(parse_ok("  // only a comment\n").body.is_empty());
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse_ok("1 + 2 * 3");
        let ExprKind::Binary { op, right, .. } = &only_expr(&program).kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn exponent_is_right_associative() {
        let program = parse_ok("2 ** 3 ** 2");
        let ExprKind::Binary { left, .. } = &only_expr(&program).kind else {
            panic!("expected binary expression");
        };
        assert!(matches!(left.kind, ExprKind::Number(n) if n == 2.0));
    }

    #[test]
    fn semicolons_are_optional() {
        let program = parse_ok("let a = 1\nlet b = 2\nconsole.log(a + b)");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn keywords_need_a_boundary() {
        let program = parse_ok("let double = 2; let iffy = double; const newer = iffy");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn arrow_functions_take_their_binding_name() {
        let program = parse_ok("const add = (a, b) => a + b");
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("expected declaration");
        };
        let Some(Expr {
            kind: ExprKind::Function(def),
            ..
        }) = &decl.declarators[0].init
        else {
            panic!("expected function initializer");
        };
        assert_eq!(def.name.as_deref(), Some("add"));
        assert!(def.is_arrow);
        assert_eq!(def.params.len(), 2);
    }

    #[test]
    fn template_literals_split_into_quasis() {
        let program = parse_ok("`Hello ${name}, you are ${age + 1}!`");
        let ExprKind::Template { quasis, exprs } = &only_expr(&program).kind else {
            panic!("expected template");
        };
        assert_eq!(quasis.len(), 3);
        assert_eq!(exprs.len(), 2);
        assert_eq!(&*quasis[0], "Hello ");
        assert_eq!(&*quasis[2], "!");
    }

    #[test]
    fn derived_classes_get_a_forwarding_constructor() {
        let program = parse_ok("class Dog extends Animal { speak() { return 1 } }");
        let StmtKind::Class(class) = &program.body[0].kind else {
            panic!("expected class");
        };
        assert!(class.parent.is_some());
        assert!(class.constructor.rest.is_some());
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn var_declarations_are_collected_for_hoisting() {
        let program = parse_ok("if (true) { var a = 1 } for (var i = 0; i < 2; i++) {} let b = 2");
        let names: Vec<&str> = program.var_names.iter().map(|n| &**n).collect();
        assert_eq!(names, vec!["a", "i"]);
    }

    #[test]
    fn destructuring_declarations_parse() {
        let program = parse_ok("const { a, b: [c, , d] = [], ...rest } = obj");
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("expected declaration");
        };
        let mut names = Vec::new();
        decl.declarators[0].target.bound_names(&mut names);
        let names: Vec<&str> = names.iter().map(|n| &**n).collect();
        assert_eq!(names, vec!["a", "c", "d", "rest"]);
    }

    #[test]
    fn escapes_are_resolved() {
        let program = parse_ok(r#"'it\'s\nA\x42'"#);
        assert!(matches!(&only_expr(&program).kind, ExprKind::String(s) if &**s == "it's\nAB"));
    }

    #[test]
    fn numeric_literal_forms() {
        for (text, expected) in [("0xff", 255.0), ("0b101", 5.0), ("1_000", 1000.0), (".5", 0.5), ("2e3", 2000.0)] {
            let program = parse_ok(text);
            assert!(
                matches!(only_expr(&program).kind, ExprKind::Number(n) if n == expected),
                "{} should parse to {}",
                text,
                expected
            );
        }
    }

    #[test]
    fn async_functions_are_reported_as_unsupported() {
        let error = parse_err("async function main() {}");
        assert!(matches!(error.kind, ErrorKind::UnsupportedSyntax { .. }));
        assert!(error.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn with_statements_are_reported_as_unsupported() {
        let error = parse_err("console.log('before'); with ({}) {}");
        match &error.kind {
            ErrorKind::UnsupportedSyntax { feature } => assert_eq!(feature, "`with`"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(error.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn const_requires_initializer() {
        let error = parse_err("const x;");
        assert!(error.to_string().contains("Missing initializer"));
    }

    #[test]
    fn unbalanced_input_points_at_the_problem() {
        let error = parse_err("console.log((1 + 2)");
        assert!(matches!(error.kind, ErrorKind::UnexpectedToken { .. }));
        assert_eq!(error.source_info.phase, "parse");
    }

    #[test]
    fn invalid_assignment_targets_are_rejected() {
        let error = parse_err("f() = 1");
        assert!(error.to_string().contains("Invalid left-hand side"));
    }
}
