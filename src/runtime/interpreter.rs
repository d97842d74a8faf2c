//! Tree-walking evaluation of snippet programs.
//!
//! One [`Interpreter`] is one isolated run: it owns the global scope, the intrinsic
//! prototypes, the event loop, the seeded random source and every object allocated during
//! the run. Nothing here is shared between runs.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::runtime::budget::Budget;
use crate::runtime::event_loop::EventLoop;
use crate::runtime::inspect::{error_summary, inspect_nested};
use crate::runtime::output::OutputSink;
use crate::runtime::realm::{Proto, Realm};
use crate::runtime::scope::{
    self, function_scope, lookup, new_scope, AssignError, LookupError, ScopeKind, ScopeRef,
    CONSTRUCTOR, HOME, NEW_TARGET, PENDING_THIS, THIS,
};
use crate::runtime::value::{
    array_index, code_unit_at, function_name, lookup_property, utf16_len, Callable, ClassRuntime,
    Closure, FunctionKind, NativeCall, NativeData, NativeFn, NativeFunction, Object, ObjectKind,
    ObjectRef, PropertyKey, Value,
};
use crate::syntax::*;

/// Longest string a snippet may build.
pub const MAX_STRING_LENGTH: usize = 1 << 24;
/// Longest array a snippet may build.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

const MUST_CALL_SUPER: &str =
    "Must call super constructor in derived class before accessing 'this' or returning from derived constructor";

pub type Eval<T> = Result<T, Interrupt>;

/// Why evaluation stopped early.
#[derive(Debug)]
pub enum Interrupt {
    Throw(Thrown),
    Timeout,
    Cancelled,
}

#[derive(Debug)]
pub struct Thrown {
    pub value: Value,
    pub span: Option<Span>,
    /// Raised because a rejected promise had no handler once the microtask queue drained.
    pub unhandled_rejection: bool,
}

impl Interrupt {
    pub fn throw(value: Value) -> Self {
        Interrupt::Throw(Thrown {
            value,
            span: None,
            unhandled_rejection: false,
        })
    }

    /// Attributes the error to `span` unless a more precise location is already known.
    pub fn with_span(self, span: Span) -> Self {
        match self {
            Interrupt::Throw(mut thrown) if thrown.span.is_none() => {
                thrown.span = Some(span);
                Interrupt::Throw(thrown)
            }
            other => other,
        }
    }
}

#[derive(Debug)]
pub enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Declare(DeclKind),
    Assign,
}

/// `this` for a call: a value, or a derived-class instance still waiting for `super(...)`.
pub enum ThisBinding {
    Value(Value),
    Pending(ObjectRef),
}

pub struct InterpreterOptions {
    pub max_call_depth: usize,
    pub seed: u64,
    pub budget: Budget,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 2000,
            seed: 0,
            budget: Budget::unlimited(),
        }
    }
}

/// Tracks every object of the run so teardown can break reference cycles.
#[derive(Default)]
struct Heap {
    objects: Vec<Weak<RefCell<Object>>>,
    prune_at: usize,
}

impl Heap {
    fn track(&mut self, obj: &ObjectRef) {
        if self.objects.len() >= self.prune_at.max(4096) {
            self.objects.retain(|weak| weak.strong_count() > 0);
            self.prune_at = self.objects.len() * 2;
        }
        self.objects.push(Rc::downgrade(obj));
    }

    fn clear(&mut self) {
        for weak in self.objects.drain(..) {
            if let Some(obj) = weak.upgrade() {
                if let Ok(mut obj) = obj.try_borrow_mut() {
                    obj.properties.clear();
                    obj.prototype = None;
                    obj.kind = ObjectKind::Ordinary;
                }
            }
        }
    }
}

pub struct Interpreter {
    source: Rc<str>,
    pub(crate) realm: Realm,
    pub(crate) global: ScopeRef,
    pub(crate) event_loop: EventLoop,
    output: Box<dyn OutputSink>,
    pub(crate) budget: Budget,
    call_depth: usize,
    max_call_depth: usize,
    pub(crate) rng: Xoshiro256StarStar,
    pub(crate) console_indent: usize,
    /// Span of the innermost call expression being evaluated.
    pub(crate) call_site: Option<Span>,
    heap: Heap,
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.global.borrow_mut().clear();
        self.heap.clear();
    }
}

impl Interpreter {
    pub fn new(source: &str, output: Box<dyn OutputSink>, options: InterpreterOptions) -> Self {
        let mut heap = Heap::default();
        let realm = Realm::new(|obj| heap.track(obj));
        let global = new_scope(ScopeKind::Global, None);

        let mut interp = Self {
            source: Rc::from(source),
            realm,
            global,
            event_loop: EventLoop::new(),
            output,
            budget: options.budget,
            call_depth: 0,
            max_call_depth: options.max_call_depth,
            rng: Xoshiro256StarStar::seed_from_u64(options.seed),
            console_indent: 0,
            call_site: None,
            heap,
        };

        let module_this = interp.new_object();
        {
            let mut global = interp.global.borrow_mut();
            global.declare(Rc::from(THIS), Some(Value::Object(module_this)), false);
            global.declare(Rc::from("undefined"), Some(Value::Undefined), false);
        }
        crate::builtins::install(&mut interp);
        interp
    }

    /// Runs the program body, then the event loop until no work is left.
    pub fn run(&mut self, program: &Program) -> Eval<()> {
        let global = self.global.clone();
        for name in &program.var_names {
            if !global.borrow().has_own(name) {
                global
                    .borrow_mut()
                    .declare(name.clone(), Some(Value::Undefined), true);
            }
        }
        self.hoist_declarations(&program.body, &global)?;
        for stmt in &program.body {
            if !matches!(self.exec_stmt(stmt, &global)?, Completion::Normal) {
                break;
            }
        }
        self.run_event_loop()
    }

    // ========================================================================
    // ALLOCATION
    // ========================================================================

    pub fn alloc(&mut self, kind: ObjectKind, prototype: Option<ObjectRef>) -> ObjectRef {
        let obj = Rc::new(RefCell::new(Object::new(kind, prototype)));
        self.heap.track(&obj);
        obj
    }

    pub fn proto(&self, proto: Proto) -> ObjectRef {
        self.realm.get(proto)
    }

    pub fn new_object(&mut self) -> ObjectRef {
        let proto = self.proto(Proto::Object);
        self.alloc(ObjectKind::Ordinary, Some(proto))
    }

    pub fn new_array(&mut self, items: Vec<Value>) -> Value {
        let proto = self.proto(Proto::Array);
        Value::Object(self.alloc(ObjectKind::Array(items), Some(proto)))
    }

    pub fn new_native(&mut self, name: &str, func: NativeFn, data: NativeData, arity: usize) -> Value {
        let proto = self.proto(Proto::Function);
        let native = NativeFunction {
            name: Rc::from(name),
            func,
            data,
            constructor: false,
            arity,
        };
        Value::Object(self.alloc(ObjectKind::Function(Callable::Native(native)), Some(proto)))
    }

    pub fn make_closure(
        &mut self,
        def: &Rc<FunctionDef>,
        scope: &ScopeRef,
        kind: FunctionKind,
        home: Option<ObjectRef>,
    ) -> Value {
        let closure = Closure {
            def: def.clone(),
            scope: scope.clone(),
            kind,
            home,
            class: None,
        };
        let function_proto = self.proto(Proto::Function);
        let func = self.alloc(
            ObjectKind::Function(Callable::Closure(Rc::new(closure))),
            Some(function_proto),
        );
        if kind == FunctionKind::Normal {
            let prototype = self.new_object();
            prototype
                .borrow_mut()
                .define_hidden(Rc::from("constructor"), Value::Object(func.clone()));
            func.borrow_mut()
                .define_hidden(Rc::from("prototype"), Value::Object(prototype));
        }
        Value::Object(func)
    }

    // ========================================================================
    // ERRORS
    // ========================================================================

    pub fn make_error(&mut self, proto: Proto, message: &str) -> Value {
        let prototype = self.proto(proto);
        let error = self.alloc(ObjectKind::Error, Some(prototype));
        error
            .borrow_mut()
            .properties
            .insert(Rc::from("message"), Value::string(message));
        Value::Object(error)
    }

    pub fn error(&mut self, proto: Proto, message: impl AsRef<str>) -> Interrupt {
        Interrupt::throw(self.make_error(proto, message.as_ref()))
    }

    pub fn type_error(&mut self, message: impl AsRef<str>) -> Interrupt {
        self.error(Proto::TypeError, message)
    }

    pub fn range_error(&mut self, message: impl AsRef<str>) -> Interrupt {
        self.error(Proto::RangeError, message)
    }

    pub fn reference_error(&mut self, message: impl AsRef<str>) -> Interrupt {
        self.error(Proto::ReferenceError, message)
    }

    pub fn source_text(&self, span: Span) -> &str {
        self.source.get(span.start..span.end).unwrap_or("expression")
    }

    pub fn check_string_length(&mut self, len: usize) -> Eval<()> {
        if len > MAX_STRING_LENGTH {
            return Err(self.range_error("Invalid string length"));
        }
        Ok(())
    }

    pub fn check_array_length(&mut self, len: usize) -> Eval<()> {
        if len > MAX_ARRAY_LENGTH {
            return Err(self.range_error("Invalid array length"));
        }
        Ok(())
    }

    pub fn emit(&mut self, text: &str, span: Option<&Span>) {
        self.output.emit(text, span);
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    /// Function declarations are created up front; `let`, `const` and `class` enter their
    /// dead zone until the declaration runs.
    fn hoist_declarations(&mut self, body: &[Stmt], scope: &ScopeRef) -> Eval<()> {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Function(def) => {
                    let func = self.make_closure(def, scope, FunctionKind::Normal, None);
                    if let Some(name) = &def.name {
                        scope.borrow_mut().declare(name.clone(), Some(func), true);
                    }
                }
                StmtKind::VarDecl(decl) if decl.kind != DeclKind::Var => {
                    let mut names = Vec::new();
                    for declarator in &decl.declarators {
                        declarator.target.bound_names(&mut names);
                    }
                    let mut env = scope.borrow_mut();
                    for name in names {
                        env.declare(name, None, decl.kind != DeclKind::Const);
                    }
                }
                StmtKind::Class(def) => {
                    if let Some(name) = &def.name {
                        scope.borrow_mut().declare(name.clone(), None, true);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Eval<Completion> {
        self.budget.tick()?;
        self.exec_stmt_inner(stmt, scope)
            .map_err(|interrupt| interrupt.with_span(stmt.span))
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Eval<Completion> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Completion::Normal)
            }

            StmtKind::VarDecl(decl) => {
                self.exec_var_decl(decl, scope)?;
                Ok(Completion::Normal)
            }

            StmtKind::Function(_) | StmtKind::Empty => Ok(Completion::Normal),

            StmtKind::Class(def) => {
                let class = self.eval_class(def, scope)?;
                if let Some(name) = &def.name {
                    scope::initialize(scope, name, class);
                }
                Ok(Completion::Normal)
            }

            StmtKind::Block(body) => self.exec_block(body, scope),

            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec_stmt(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }

            StmtKind::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec_stmt(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }

            StmtKind::DoWhile { body, test } => {
                loop {
                    match self.exec_stmt(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }

            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, scope),

            StmtKind::ForEach {
                kind,
                binding,
                iterable,
                body,
            } => self.exec_for_each(*kind, binding, iterable, body, scope),

            StmtKind::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, scope),

            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => self.exec_try(block, handler.as_ref(), finalizer.as_deref(), scope),

            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }

            StmtKind::Break => Ok(Completion::Break),

            StmtKind::Continue => Ok(Completion::Continue),

            StmtKind::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                Err(Interrupt::Throw(Thrown {
                    value,
                    span: Some(expr.span),
                    unhandled_rejection: false,
                }))
            }
        }
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &ScopeRef) -> Eval<Completion> {
        let block = new_scope(ScopeKind::Block, Some(scope));
        self.exec_statements(body, &block)
    }

    fn exec_statements(&mut self, body: &[Stmt], scope: &ScopeRef) -> Eval<Completion> {
        self.hoist_declarations(body, scope)?;
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_var_decl(&mut self, decl: &VarDecl, scope: &ScopeRef) -> Eval<()> {
        for declarator in &decl.declarators {
            let value = match &declarator.init {
                Some(init) => self.eval(init, scope)?,
                None if decl.kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&declarator.target, value, scope, BindMode::Declare(decl.kind))?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &ScopeRef,
    ) -> Eval<Completion> {
        let loop_scope = new_scope(ScopeKind::Block, Some(scope));
        let mut per_iteration = Vec::new();
        match init {
            Some(ForInit::VarDecl(decl)) => {
                if decl.kind != DeclKind::Var {
                    for declarator in &decl.declarators {
                        declarator.target.bound_names(&mut per_iteration);
                    }
                    let mut env = loop_scope.borrow_mut();
                    for name in &per_iteration {
                        env.declare(name.clone(), None, decl.kind != DeclKind::Const);
                    }
                }
                self.exec_var_decl(decl, &loop_scope)?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval(expr, &loop_scope)?;
            }
            None => {}
        }

        // Each iteration gets fresh copies of the loop's lexical bindings so closures
        // created in the body capture that iteration's values.
        let mut iteration = copy_iteration_scope(&loop_scope, scope, &per_iteration);
        loop {
            if let Some(test) = test {
                if !self.eval(test, &iteration)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &iteration)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
            iteration = copy_iteration_scope(&iteration, scope, &per_iteration);
            if let Some(update) = update {
                self.eval(update, &iteration)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_each(
        &mut self,
        kind: ForEachKind,
        binding: &ForBinding,
        iterable: &Expr,
        body: &Stmt,
        scope: &ScopeRef,
    ) -> Eval<Completion> {
        let subject = self.eval(iterable, scope)?;
        let mut items = match kind {
            ForEachKind::Of => self.iterator(&subject, iterable.span)?,
            ForEachKind::In => ValueIter::List(self.enumerable_keys(&subject).into_iter()),
        };

        while let Some(item) = items.next() {
            self.budget.tick()?;
            let iteration = new_scope(ScopeKind::Block, Some(scope));
            match binding.kind {
                Some(decl_kind) => {
                    let mut names = Vec::new();
                    binding.target.bound_names(&mut names);
                    for name in names {
                        iteration.borrow_mut().declare(name, None, decl_kind != DeclKind::Const);
                    }
                    self.bind_pattern(&binding.target, item, &iteration, BindMode::Declare(decl_kind))?;
                }
                None => self.bind_pattern(&binding.target, item, &iteration, BindMode::Assign)?,
            }
            match self.exec_stmt(body, &iteration)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], scope: &ScopeRef) -> Eval<Completion> {
        let value = self.eval(discriminant, scope)?;
        let switch_scope = new_scope(ScopeKind::Block, Some(scope));
        for case in cases {
            self.hoist_declarations(&case.body, &switch_scope)?;
        }

        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let candidate = self.eval(test, &switch_scope)?;
                if strict_equals(&value, &candidate) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));

        if let Some(start) = start {
            for case in &cases[start..] {
                for stmt in &case.body {
                    match self.exec_stmt(stmt, &switch_scope)? {
                        Completion::Normal => {}
                        Completion::Break => return Ok(Completion::Normal),
                        other => return Ok(other),
                    }
                }
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        scope: &ScopeRef,
    ) -> Eval<Completion> {
        let result = match (self.exec_block(block, scope), handler) {
            (Err(Interrupt::Throw(thrown)), Some(handler)) => {
                let catch_scope = new_scope(ScopeKind::Block, Some(scope));
                match &handler.param {
                    Some(param) => self
                        .bind_pattern(param, thrown.value, &catch_scope, BindMode::Declare(DeclKind::Let))
                        .and_then(|_| self.exec_block(&handler.body, &catch_scope)),
                    None => self.exec_block(&handler.body, &catch_scope),
                }
            }
            (result, _) => result,
        };

        if matches!(result, Err(Interrupt::Timeout | Interrupt::Cancelled)) {
            return result;
        }

        match finalizer {
            Some(finalizer) => match self.exec_block(finalizer, scope)? {
                Completion::Normal => result,
                abrupt => Ok(abrupt),
            },
            None => result,
        }
    }

    // ========================================================================
    // BINDING
    // ========================================================================

    pub(crate) fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &ScopeRef,
        mode: BindMode,
    ) -> Eval<()> {
        match pattern {
            Pattern::Ident(name, _) => self.bind_name(name, value, scope, mode),

            Pattern::Array { elements, rest, span } => {
                let items: Vec<Value> = self.iterator(&value, *span)?.collect();
                for (index, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = items.get(index).cloned().unwrap_or_default();
                        self.bind_element(element, item, scope, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    let remaining = items.get(elements.len()..).unwrap_or(&[]).to_vec();
                    let array = self.new_array(remaining);
                    self.bind_pattern(rest, array, scope, mode)?;
                }
                Ok(())
            }

            Pattern::Object { props, rest, .. } => {
                if value.is_nullish() {
                    let shown = if matches!(value, Value::Null) { "null" } else { "undefined" };
                    let message = match props.first().map(|p| &p.key) {
                        Some(PropKey::Static(key)) => format!(
                            "Cannot destructure property '{}' of '{}' as it is {}.",
                            key, shown, shown
                        ),
                        _ => format!("Cannot destructure '{}' as it is {}.", shown, shown),
                    };
                    return Err(self.type_error(message));
                }

                let mut used = Vec::new();
                for prop in props {
                    let key = self.prop_key(&prop.key, scope)?;
                    let item = self.get(&value, &key)?;
                    used.push(key);
                    self.bind_element(&prop.value, item, scope, mode)?;
                }
                if let Some(rest) = rest {
                    let copy = self.new_object();
                    for key in self.own_enumerable_keys(&value) {
                        if !used.contains(&key) {
                            let item = self.get(&value, &key)?;
                            copy.borrow_mut().properties.insert(key, item);
                        }
                    }
                    self.bind_name(rest, Value::Object(copy), scope, mode)?;
                }
                Ok(())
            }

            Pattern::Expr(target) => {
                let (object, key) = self.member_reference(target, scope)?;
                self.set(&object, &key, value)
            }
        }
    }

    fn bind_element(&mut self, element: &PatternElement, value: Value, scope: &ScopeRef, mode: BindMode) -> Eval<()> {
        let value = match (&value, &element.default) {
            (Value::Undefined, Some(default)) => self.eval(default, scope)?,
            _ => value,
        };
        self.bind_pattern(&element.pattern, value, scope, mode)
    }

    fn bind_name(&mut self, name: &Name, value: Value, scope: &ScopeRef, mode: BindMode) -> Eval<()> {
        match mode {
            BindMode::Declare(DeclKind::Var) => {
                function_scope(scope)
                    .borrow_mut()
                    .declare(name.clone(), Some(value), true);
                Ok(())
            }
            BindMode::Declare(kind) => {
                scope
                    .borrow_mut()
                    .declare(name.clone(), Some(value), kind != DeclKind::Const);
                Ok(())
            }
            BindMode::Assign => self.assign_name(name, value, scope),
        }
    }

    fn assign_name(&mut self, name: &str, value: Value, scope: &ScopeRef) -> Eval<()> {
        match scope::assign(scope, name, value) {
            Ok(()) => Ok(()),
            Err(AssignError::Uninitialized) => Err(self.reference_error(format!(
                "Cannot access '{}' before initialization",
                name
            ))),
            Err(AssignError::Constant) => Err(self.type_error("Assignment to constant variable.")),
        }
    }

    fn lookup_name(&mut self, name: &str, scope: &ScopeRef) -> Eval<Value> {
        match lookup(scope, name) {
            Ok(value) => Ok(value),
            Err(LookupError::NotDefined) => Err(self.reference_error(format!("{} is not defined", name))),
            Err(LookupError::Uninitialized) => Err(self.reference_error(format!(
                "Cannot access '{}' before initialization",
                name
            ))),
        }
    }

    fn this_value(&mut self, scope: &ScopeRef) -> Eval<Value> {
        match lookup(scope, THIS) {
            Ok(value) => Ok(value),
            Err(LookupError::Uninitialized) => Err(self.reference_error(MUST_CALL_SUPER)),
            Err(LookupError::NotDefined) => Ok(Value::Undefined),
        }
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &ScopeRef) -> Eval<Value> {
        self.eval_inner(expr, scope)
            .map_err(|interrupt| interrupt.with_span(expr.span))
    }

    fn eval_inner(&mut self, expr: &Expr, scope: &ScopeRef) -> Eval<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::This => self.this_value(scope),
            ExprKind::Ident(name) => self.lookup_name(name, scope),

            ExprKind::Template { quasis, exprs } => {
                let mut text = String::new();
                for (index, quasi) in quasis.iter().enumerate() {
                    text.push_str(quasi);
                    if let Some(expr) = exprs.get(index) {
                        let value = self.eval(expr, scope)?;
                        text.push_str(&self.to_string(&value)?);
                        self.check_string_length(text.len())?;
                    }
                }
                Ok(Value::string(text))
            }

            ExprKind::Array(elements) => {
                let items = self.eval_elements(elements, scope)?;
                Ok(self.new_array(items))
            }

            ExprKind::Object(props) => self.eval_object_literal(props, scope),

            ExprKind::Function(def) => {
                let kind = if def.is_arrow {
                    FunctionKind::Arrow
                } else {
                    FunctionKind::Normal
                };
                Ok(self.make_closure(def, scope, kind, None))
            }

            ExprKind::Class(def) => self.eval_class(def, scope),

            ExprKind::Unary { op, argument } => self.eval_unary(*op, argument, scope),

            ExprKind::Update { op, prefix, target } => {
                let delta = match op {
                    UpdateOp::Increment => 1.0,
                    UpdateOp::Decrement => -1.0,
                };
                let old = match &target.kind {
                    ExprKind::Ident(name) => {
                        let current = self.lookup_name(name, scope)?;
                        let old = self.to_number(&current)?;
                        self.assign_name(name, Value::Number(old + delta), scope)?;
                        old
                    }
                    _ => {
                        let (object, key) = self.member_reference(target, scope)?;
                        let current = self.get(&object, &key)?;
                        let old = self.to_number(&current)?;
                        self.set(&object, &key, Value::Number(old + delta))?;
                        old
                    }
                };
                Ok(Value::Number(if *prefix { old + delta } else { old }))
            }

            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary_op(*op, &left, &right)
            }

            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                if short_circuits(*op, &left) {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }

            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }

            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),

            ExprKind::Member { .. } | ExprKind::Call { .. } => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or_default())
            }

            ExprKind::New { callee, args } => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_elements(args, scope)?;
                if !self.is_constructor(&constructor) {
                    let text = self.source_text(callee.span).to_string();
                    return Err(self.type_error(format!("{} is not a constructor", text)));
                }
                self.construct(&constructor, &args, None)
            }

            ExprKind::SuperCall(args) => self.eval_super_call(args, scope),

            ExprKind::SuperMember(name) => self.super_get(name, scope),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, argument: &Expr, scope: &ScopeRef) -> Eval<Value> {
        match op {
            UnaryOp::TypeOf => {
                let value = match &argument.kind {
                    ExprKind::Ident(name) => match lookup(scope, name) {
                        Ok(value) => value,
                        Err(LookupError::NotDefined) => Value::Undefined,
                        Err(LookupError::Uninitialized) => self.lookup_name(name, scope)?,
                    },
                    _ => self.eval(argument, scope)?,
                };
                Ok(Value::string(value.type_of()))
            }
            UnaryOp::Delete => match &argument.kind {
                ExprKind::Member { optional: false, .. } => {
                    let (object, key) = self.member_reference(argument, scope)?;
                    Ok(Value::Bool(self.delete_property(&object, &key)?))
                }
                ExprKind::Ident(_) => Ok(Value::Bool(false)),
                _ => {
                    self.eval(argument, scope)?;
                    Ok(Value::Bool(true))
                }
            },
            UnaryOp::Not => Ok(Value::Bool(!self.eval(argument, scope)?.truthy())),
            UnaryOp::Neg => {
                let value = self.eval(argument, scope)?;
                Ok(Value::Number(-self.to_number(&value)?))
            }
            UnaryOp::Plus => {
                let value = self.eval(argument, scope)?;
                Ok(Value::Number(self.to_number(&value)?))
            }
            UnaryOp::Void => {
                self.eval(argument, scope)?;
                Ok(Value::Undefined)
            }
        }
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Pattern, value: &Expr, scope: &ScopeRef) -> Eval<Value> {
        match (op, target) {
            (AssignOp::Assign, Pattern::Ident(name, _)) => {
                let value = self.eval(value, scope)?;
                self.assign_name(name, value.clone(), scope)?;
                Ok(value)
            }
            (AssignOp::Assign, Pattern::Expr(member)) => {
                let (object, key) = self.member_reference(member, scope)?;
                let value = self.eval(value, scope)?;
                self.set(&object, &key, value.clone())?;
                Ok(value)
            }
            (AssignOp::Assign, pattern) => {
                let value = self.eval(value, scope)?;
                self.bind_pattern(pattern, value.clone(), scope, BindMode::Assign)?;
                Ok(value)
            }
            (op, Pattern::Ident(name, _)) => {
                let current = self.lookup_name(name, scope)?;
                let Some(result) = self.combine(op, current, value, scope)? else {
                    return self.lookup_name(name, scope);
                };
                self.assign_name(name, result.clone(), scope)?;
                Ok(result)
            }
            (op, Pattern::Expr(member)) => {
                let (object, key) = self.member_reference(member, scope)?;
                let current = self.get(&object, &key)?;
                let Some(result) = self.combine(op, current.clone(), value, scope)? else {
                    return Ok(current);
                };
                self.set(&object, &key, result.clone())?;
                Ok(result)
            }
            (_, pattern) => {
                let span = pattern.span();
                Err(self
                    .error(Proto::SyntaxError, "Invalid left-hand side in assignment")
                    .with_span(span))
            }
        }
    }

    /// Value to store for a compound assignment; `None` when a logical assignment short-circuits.
    fn combine(&mut self, op: AssignOp, current: Value, value: &Expr, scope: &ScopeRef) -> Eval<Option<Value>> {
        match op {
            AssignOp::Compound(binary) => {
                let right = self.eval(value, scope)?;
                Ok(Some(self.binary_op(binary, &current, &right)?))
            }
            AssignOp::Logical(logical) => {
                if short_circuits(logical, &current) {
                    Ok(None)
                } else {
                    Ok(Some(self.eval(value, scope)?))
                }
            }
            AssignOp::Assign => Ok(Some(self.eval(value, scope)?)),
        }
    }

    fn eval_elements(&mut self, elements: &[ArrayElement], scope: &ScopeRef) -> Eval<Vec<Value>> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ArrayElement::Item(expr) => values.push(self.eval(expr, scope)?),
                ArrayElement::Spread(expr) => {
                    let spread = self.eval(expr, scope)?;
                    values.extend(self.iterator(&spread, expr.span)?);
                    self.check_array_length(values.len())?;
                }
            }
        }
        Ok(values)
    }

    fn eval_object_literal(&mut self, props: &[PropertyDef], scope: &ScopeRef) -> Eval<Value> {
        let object = self.new_object();
        for prop in props {
            match prop {
                PropertyDef::KeyValue(key, value) => {
                    let key = self.prop_key(key, scope)?;
                    let value = self.eval(value, scope)?;
                    if &*key == "__proto__" {
                        match value {
                            Value::Object(proto) => object.borrow_mut().prototype = Some(proto),
                            Value::Null => object.borrow_mut().prototype = None,
                            _ => {}
                        }
                        continue;
                    }
                    object.borrow_mut().properties.insert(key, value);
                }
                PropertyDef::Shorthand(name, _) => {
                    let value = self.lookup_name(name, scope)?;
                    object.borrow_mut().properties.insert(name.clone(), value);
                }
                PropertyDef::Method(key, def) => {
                    let key = self.prop_key(key, scope)?;
                    let method = self.make_closure(def, scope, FunctionKind::Method, Some(object.clone()));
                    object.borrow_mut().properties.insert(key, method);
                }
                PropertyDef::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    for key in self.own_enumerable_keys(&source) {
                        let value = self.get(&source, &key)?;
                        object.borrow_mut().properties.insert(key, value);
                    }
                }
            }
        }
        Ok(Value::Object(object))
    }

    pub(crate) fn prop_key(&mut self, key: &PropKey, scope: &ScopeRef) -> Eval<PropertyKey> {
        match key {
            PropKey::Static(name) => Ok(name.clone()),
            PropKey::Computed(expr) => {
                let value = self.eval(expr, scope)?;
                self.to_property_key(&value)
            }
        }
    }

    fn member_key(&mut self, property: &MemberProp, scope: &ScopeRef) -> Eval<PropertyKey> {
        match property {
            MemberProp::Named(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => {
                let value = self.eval(expr, scope)?;
                self.to_property_key(&value)
            }
        }
    }

    /// Object and key of an assignable member expression.
    fn member_reference(&mut self, target: &Expr, scope: &ScopeRef) -> Eval<(Value, PropertyKey)> {
        let ExprKind::Member { object, property, .. } = &target.kind else {
            let text = self.source_text(target.span).to_string();
            return Err(self.error(
                Proto::SyntaxError,
                format!("Invalid left-hand side in assignment: {}", text),
            ));
        };
        let object = self.eval(object, scope)?;
        let key = self.member_key(property, scope)?;
        Ok((object, key))
    }

    /// Evaluates member and call chains; `None` means an optional link short-circuited.
    fn eval_chain(&mut self, expr: &Expr, scope: &ScopeRef) -> Eval<Option<Value>> {
        self.eval_chain_inner(expr, scope)
            .map_err(|interrupt| interrupt.with_span(expr.span))
    }

    fn eval_chain_inner(&mut self, expr: &Expr, scope: &ScopeRef) -> Eval<Option<Value>> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                Ok(Some(self.get(&target, &key)?))
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let Some((func, this)) = self.eval_callee(callee, scope)? else {
                    return Ok(None);
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_elements(args, scope)?;
                if !func.is_callable() {
                    let text = self.source_text(callee.span).to_string();
                    return Err(self.type_error(format!("{} is not a function", text)));
                }
                let caller = self.call_site.replace(expr.span);
                let result = self.call(&func, this, &args);
                self.call_site = caller;
                Ok(Some(result?))
            }
            _ => Ok(Some(self.eval(expr, scope)?)),
        }
    }

    fn eval_callee(&mut self, callee: &Expr, scope: &ScopeRef) -> Eval<Option<(Value, Value)>> {
        match &callee.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                let func = self
                    .get(&target, &key)
                    .map_err(|interrupt| interrupt.with_span(callee.span))?;
                Ok(Some((func, target)))
            }
            ExprKind::SuperMember(name) => {
                let this = self.this_value(scope)?;
                let func = self.super_get(name, scope)?;
                Ok(Some((func, this)))
            }
            _ => Ok(self
                .eval_chain(callee, scope)?
                .map(|func| (func, Value::Undefined))),
        }
    }

    // ========================================================================
    // CLASSES
    // ========================================================================

    fn eval_class(&mut self, def: &Rc<ClassDef>, scope: &ScopeRef) -> Eval<Value> {
        let parent = match &def.parent {
            Some(expr) => {
                let parent = self.eval(expr, scope)?;
                match &parent {
                    Value::Null => None,
                    value if self.is_constructor(value) => Some(parent),
                    value => {
                        let shown = inspect_nested(value);
                        return Err(self.type_error(format!(
                            "Class extends value {} is not a constructor or null",
                            shown
                        )));
                    }
                }
            }
            None => None,
        };

        let proto_parent = match &parent {
            Some(parent) => match self.get(parent, "prototype")? {
                Value::Object(proto) => Some(proto),
                Value::Null => None,
                other => {
                    let shown = inspect_nested(&other);
                    return Err(self.type_error(format!(
                        "Class extends value does not have valid prototype property {}",
                        shown
                    )));
                }
            },
            None if def.parent.is_some() => None,
            None => Some(self.proto(Proto::Object)),
        };
        let prototype = self.alloc(ObjectKind::Ordinary, proto_parent);

        let class_scope = new_scope(ScopeKind::Block, Some(scope));
        if let Some(name) = &def.name {
            class_scope.borrow_mut().declare(name.clone(), None, false);
        }

        let mut fields = Vec::new();
        for (index, field) in def.fields.iter().enumerate() {
            if !field.is_static {
                fields.push((self.prop_key(&field.key, &class_scope)?, index));
            }
        }

        let runtime = ClassRuntime {
            def: def.clone(),
            scope: class_scope.clone(),
            parent: parent.clone(),
            prototype: prototype.clone(),
            fields,
        };
        let closure = Closure {
            def: def.constructor.clone(),
            scope: class_scope.clone(),
            kind: FunctionKind::ClassConstructor,
            home: Some(prototype.clone()),
            class: Some(Rc::new(runtime)),
        };
        let ctor_proto = match &parent {
            Some(Value::Object(parent)) => parent.clone(),
            _ => self.proto(Proto::Function),
        };
        let ctor = self.alloc(
            ObjectKind::Function(Callable::Closure(Rc::new(closure))),
            Some(ctor_proto),
        );
        ctor.borrow_mut()
            .define_hidden(Rc::from("prototype"), Value::Object(prototype.clone()));
        prototype
            .borrow_mut()
            .define_hidden(Rc::from("constructor"), Value::Object(ctor.clone()));

        for method in &def.methods {
            let key = self.prop_key(&method.key, &class_scope)?;
            let home = if method.is_static { ctor.clone() } else { prototype.clone() };
            let func = self.make_closure(&method.func, &class_scope, FunctionKind::Method, Some(home.clone()));
            home.borrow_mut().define_hidden(key, func);
        }

        if let Some(name) = &def.name {
            scope::initialize(&class_scope, name, Value::Object(ctor.clone()));
        }

        let static_scope = new_scope(ScopeKind::Function, Some(&class_scope));
        {
            let mut env = static_scope.borrow_mut();
            env.declare(Rc::from(THIS), Some(Value::Object(ctor.clone())), false);
            env.declare(Rc::from(HOME), Some(Value::Object(ctor.clone())), false);
        }
        for field in def.fields.iter().filter(|field| field.is_static) {
            let key = self.prop_key(&field.key, &static_scope)?;
            let value = match &field.value {
                Some(expr) => self.eval(expr, &static_scope)?,
                None => Value::Undefined,
            };
            ctor.borrow_mut().properties.insert(key, value);
        }

        Ok(Value::Object(ctor))
    }

    fn init_fields(&mut self, class: &ClassRuntime, instance: &ObjectRef) -> Eval<()> {
        if class.fields.is_empty() {
            return Ok(());
        }
        let field_scope = new_scope(ScopeKind::Function, Some(&class.scope));
        {
            let mut env = field_scope.borrow_mut();
            env.declare(Rc::from(THIS), Some(Value::Object(instance.clone())), false);
            env.declare(Rc::from(HOME), Some(Value::Object(class.prototype.clone())), false);
        }
        for (key, index) in &class.fields {
            let value = match class.def.fields.get(*index).and_then(|f| f.value.as_ref()) {
                Some(expr) => self.eval(expr, &field_scope)?,
                None => Value::Undefined,
            };
            instance.borrow_mut().properties.insert(key.clone(), value);
        }
        Ok(())
    }

    fn eval_super_call(&mut self, args: &[ArrayElement], scope: &ScopeRef) -> Eval<Value> {
        let (Ok(Value::Object(ctor)), Ok(Value::Object(pending)), Ok(Value::Object(new_target))) = (
            lookup(scope, CONSTRUCTOR),
            lookup(scope, PENDING_THIS),
            lookup(scope, NEW_TARGET),
        ) else {
            return Err(self.error(Proto::SyntaxError, "'super' keyword unexpected here"));
        };
        let class = match &ctor.borrow().kind {
            ObjectKind::Function(Callable::Closure(closure)) => closure.class.clone(),
            _ => None,
        };
        let Some(class) = class else {
            return Err(self.error(Proto::SyntaxError, "'super' keyword unexpected here"));
        };
        let Some(Value::Object(parent)) = class.parent.clone() else {
            return Err(self.error(Proto::SyntaxError, "'super' keyword unexpected here"));
        };
        if lookup(scope, THIS).is_ok() {
            return Err(self.reference_error("Super constructor may only be called once"));
        }

        let args = self.eval_elements(args, scope)?;
        let instance = self.construct_object(&parent, &args, &new_target, Some(pending))?;
        scope::initialize(scope, THIS, instance.clone());
        if let Value::Object(obj) = &instance {
            self.init_fields(&class, obj)?;
        }
        Ok(instance)
    }

    fn super_get(&mut self, name: &str, scope: &ScopeRef) -> Eval<Value> {
        let Ok(Value::Object(home)) = lookup(scope, HOME) else {
            return Err(self.error(Proto::SyntaxError, "'super' keyword unexpected here"));
        };
        let parent = home.borrow().prototype.clone();
        match parent {
            Some(parent) => self.get(&Value::Object(parent), name),
            None => Ok(Value::Undefined),
        }
    }

    // ========================================================================
    // CALLS
    // ========================================================================

    pub fn is_constructor(&self, value: &Value) -> bool {
        let Value::Object(obj) = value else {
            return false;
        };
        match &obj.borrow().kind {
            ObjectKind::Function(Callable::Closure(closure)) => {
                matches!(closure.kind, FunctionKind::Normal | FunctionKind::ClassConstructor)
            }
            ObjectKind::Function(Callable::Native(native)) => native.constructor,
            ObjectKind::Function(Callable::Bound(bound)) => {
                self.is_constructor(&Value::Object(bound.target.clone()))
            }
            _ => false,
        }
    }

    pub fn call(&mut self, func: &Value, this: Value, args: &[Value]) -> Eval<Value> {
        let Value::Object(obj) = func else {
            let shown = inspect_nested(func);
            return Err(self.type_error(format!("{} is not a function", shown)));
        };
        self.enter_call()?;
        let result = self.call_object(obj, this, args);
        self.call_depth -= 1;
        result
    }

    fn enter_call(&mut self) -> Eval<()> {
        if self.call_depth >= self.max_call_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.budget.tick()?;
        self.call_depth += 1;
        Ok(())
    }

    fn call_object(&mut self, obj: &ObjectRef, this: Value, args: &[Value]) -> Eval<Value> {
        let target = match &obj.borrow().kind {
            ObjectKind::Function(callable) => CallTarget::from(callable),
            _ => CallTarget::NotCallable,
        };
        match target {
            CallTarget::Closure(closure) => self
                .invoke_closure(&closure, obj, ThisBinding::Value(this), args, None)
                .map(|(value, _)| value),
            CallTarget::Native(func, data) => func(
                self,
                &NativeCall {
                    this: &this,
                    args,
                    data: &data,
                    new_target: None,
                },
            ),
            CallTarget::Bound(target, bound_this, bound_args) => {
                let mut all = bound_args;
                all.extend_from_slice(args);
                self.call_object(&target, bound_this, &all)
            }
            CallTarget::NotCallable => {
                let shown = inspect_nested(&Value::Object(obj.clone()));
                Err(self.type_error(format!("{} is not a function", shown)))
            }
        }
    }

    /// Runs a closure body and hands back its result and the function scope it ran in.
    fn invoke_closure(
        &mut self,
        closure: &Rc<Closure>,
        func_obj: &ObjectRef,
        this: ThisBinding,
        args: &[Value],
        new_target: Option<&ObjectRef>,
    ) -> Eval<(Value, ScopeRef)> {
        if closure.kind == FunctionKind::ClassConstructor && new_target.is_none() {
            let name = function_name(func_obj);
            return Err(self.type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                name
            )));
        }

        let def = &closure.def;
        let fscope = new_scope(ScopeKind::Function, Some(&closure.scope));
        if closure.kind != FunctionKind::Arrow {
            let arguments = self.new_array(args.to_vec());
            let mut env = fscope.borrow_mut();
            match this {
                ThisBinding::Value(value) => env.declare(Rc::from(THIS), Some(value), false),
                ThisBinding::Pending(obj) => {
                    env.declare(Rc::from(THIS), None, false);
                    env.declare(Rc::from(PENDING_THIS), Some(Value::Object(obj)), false);
                }
            }
            if let Some(home) = &closure.home {
                env.declare(Rc::from(HOME), Some(Value::Object(home.clone())), false);
            }
            if closure.kind == FunctionKind::ClassConstructor {
                env.declare(Rc::from(CONSTRUCTOR), Some(Value::Object(func_obj.clone())), false);
                if let Some(new_target) = new_target {
                    env.declare(Rc::from(NEW_TARGET), Some(Value::Object(new_target.clone())), false);
                }
            }
            env.declare(Rc::from("arguments"), Some(arguments), true);
        }

        for (index, param) in def.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_default();
            self.bind_element(param, value, &fscope, BindMode::Declare(DeclKind::Let))?;
        }
        if let Some(rest) = &def.rest {
            let rest_values = args.get(def.params.len()..).unwrap_or(&[]).to_vec();
            let array = self.new_array(rest_values);
            self.bind_pattern(rest, array, &fscope, BindMode::Declare(DeclKind::Let))?;
        }

        if closure.kind == FunctionKind::ClassConstructor {
            if let (Some(class), Ok(Value::Object(instance))) = (&closure.class, lookup(&fscope, THIS)) {
                self.init_fields(class, &instance)?;
            }
        }

        let value = match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &fscope)?,
            FunctionBody::Block(body) => {
                for name in &def.var_names {
                    if !fscope.borrow().has_own(name) {
                        fscope
                            .borrow_mut()
                            .declare(name.clone(), Some(Value::Undefined), true);
                    }
                }
                match self.exec_statements(body, &fscope)? {
                    Completion::Return(value) => value,
                    _ => Value::Undefined,
                }
            }
        };
        Ok((value, fscope))
    }

    /// `new callee(...args)`.
    pub fn construct(&mut self, callee: &Value, args: &[Value], new_target: Option<&ObjectRef>) -> Eval<Value> {
        let Value::Object(obj) = callee else {
            let shown = inspect_nested(callee);
            return Err(self.type_error(format!("{} is not a constructor", shown)));
        };
        let new_target = new_target.cloned().unwrap_or_else(|| obj.clone());
        self.construct_object(obj, args, &new_target, None)
    }

    /// Constructs through `obj`. `existing` is the instance already allocated by a derived
    /// class when this runs on behalf of `super(...)`.
    fn construct_object(
        &mut self,
        obj: &ObjectRef,
        args: &[Value],
        new_target: &ObjectRef,
        existing: Option<ObjectRef>,
    ) -> Eval<Value> {
        let target = match &obj.borrow().kind {
            ObjectKind::Function(callable) => CallTarget::from(callable),
            _ => CallTarget::NotCallable,
        };
        if !self.is_constructor(&Value::Object(obj.clone())) {
            let name = function_name(obj);
            let name = if name.is_empty() { Rc::from("anonymous") } else { name };
            return Err(self.type_error(format!("{} is not a constructor", name)));
        }

        self.enter_call()?;
        let result = match target {
            CallTarget::Closure(closure) => {
                let derived = closure
                    .class
                    .as_ref()
                    .is_some_and(|class| class.parent.is_some());
                let instance = match existing {
                    Some(instance) => instance,
                    None => {
                        let proto = self.prototype_for(new_target, Proto::Object);
                        self.alloc(ObjectKind::Ordinary, Some(proto))
                    }
                };
                let this = if derived {
                    ThisBinding::Pending(instance.clone())
                } else {
                    ThisBinding::Value(Value::Object(instance.clone()))
                };
                self.invoke_closure(&closure, obj, this, args, Some(new_target))
                    .and_then(|(returned, fscope)| match returned {
                        Value::Object(_) => Ok(returned),
                        _ if derived => lookup(&fscope, THIS)
                            .map_err(|_| self.reference_error(MUST_CALL_SUPER)),
                        _ => Ok(Value::Object(instance)),
                    })
            }
            CallTarget::Native(func, data) => {
                let this = existing.map(Value::Object).unwrap_or_default();
                func(
                    self,
                    &NativeCall {
                        this: &this,
                        args,
                        data: &data,
                        new_target: Some(new_target),
                    },
                )
            }
            CallTarget::Bound(target, _, bound_args) => {
                let mut all = bound_args;
                all.extend_from_slice(args);
                let new_target = if Rc::ptr_eq(new_target, obj) { target.clone() } else { new_target.clone() };
                self.construct_object(&target, &all, &new_target, existing)
            }
            CallTarget::NotCallable => Err(self.type_error("value is not a constructor")),
        };
        self.call_depth -= 1;
        result
    }

    /// Prototype for an object created by `new new_target`, falling back to an intrinsic.
    pub fn prototype_for(&mut self, new_target: &ObjectRef, fallback: Proto) -> ObjectRef {
        match lookup_property(new_target, "prototype") {
            Some(Value::Object(proto)) => proto,
            _ => self.proto(fallback),
        }
    }

    // ========================================================================
    // PROPERTIES
    // ========================================================================

    pub fn get(&mut self, target: &Value, key: &str) -> Eval<Value> {
        match target {
            Value::Undefined | Value::Null => {
                let shown = if matches!(target, Value::Null) { "null" } else { "undefined" };
                Err(self.type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    shown, key
                )))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(utf16_len(s) as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(code_unit_at(s, index as usize).unwrap_or_default());
                }
                Ok(lookup_property(&self.proto(Proto::String), key).unwrap_or_default())
            }
            Value::Number(_) => Ok(lookup_property(&self.proto(Proto::Number), key).unwrap_or_default()),
            Value::Bool(_) => Ok(lookup_property(&self.proto(Proto::Boolean), key).unwrap_or_default()),
            Value::Object(obj) => Ok(self.get_object_property(obj, key)),
        }
    }

    fn get_object_property(&mut self, obj: &ObjectRef, key: &str) -> Value {
        let computed = {
            let object = obj.borrow();
            if key == "__proto__" {
                return object.prototype.clone().map(Value::Object).unwrap_or(Value::Null);
            }
            let own = object.properties.contains_key(key);
            match &object.kind {
                ObjectKind::Array(items) => {
                    if key == "length" {
                        return Value::Number(items.len() as f64);
                    }
                    if let Some(index) = array_index(key) {
                        return items.get(index as usize).cloned().unwrap_or_default();
                    }
                    None
                }
                ObjectKind::Function(callable) if !own => match key {
                    "name" => Some(VirtualProperty::Name),
                    "length" => return Value::Number(callable_arity(callable) as f64),
                    _ => None,
                },
                ObjectKind::Map(entries) if key == "size" => return Value::Number(entries.len() as f64),
                ObjectKind::Set(items) if key == "size" => return Value::Number(items.len() as f64),
                ObjectKind::Primitive(Value::String(s)) => {
                    if key == "length" {
                        return Value::Number(utf16_len(s) as f64);
                    }
                    match array_index(key).and_then(|index| code_unit_at(s, index as usize)) {
                        Some(unit) => return unit,
                        None => None,
                    }
                }
                ObjectKind::Error if key == "stack" && !own => Some(VirtualProperty::Stack),
                _ => None,
            }
        };
        match computed {
            Some(VirtualProperty::Name) => Value::String(function_name(obj)),
            Some(VirtualProperty::Stack) => {
                let head = error_summary(obj);
                Value::string(format!("{}\n    at <anonymous>", head))
            }
            None => lookup_property(obj, key).unwrap_or_default(),
        }
    }

    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> Eval<()> {
        match target {
            Value::Undefined | Value::Null => {
                let shown = if matches!(target, Value::Null) { "null" } else { "undefined" };
                Err(self.type_error(format!(
                    "Cannot set properties of {} (setting '{}')",
                    shown, key
                )))
            }
            Value::Object(obj) => self.set_object_property(obj, key, value),
            _ => Ok(()),
        }
    }

    fn set_object_property(&mut self, obj: &ObjectRef, key: &str, value: Value) -> Eval<()> {
        if key == "__proto__" {
            match value {
                Value::Object(proto) if !Rc::ptr_eq(&proto, obj) => obj.borrow_mut().prototype = Some(proto),
                Value::Null => obj.borrow_mut().prototype = None,
                _ => {}
            }
            return Ok(());
        }

        let is_array = matches!(obj.borrow().kind, ObjectKind::Array(_));
        if is_array {
            if key == "length" {
                let length = self.to_number(&value)?;
                if length < 0.0 || length.fract() != 0.0 || length as usize > MAX_ARRAY_LENGTH {
                    return Err(self.range_error("Invalid array length"));
                }
                let object = &mut *obj.borrow_mut();
                if let (false, ObjectKind::Array(items)) = (object.frozen, &mut object.kind) {
                    let length = length as usize;
                    object.holes.retain(|&hole| hole < length);
                    object.holes.extend(items.len()..length);
                    items.resize(length, Value::Undefined);
                }
                return Ok(());
            }
            if let Some(index) = array_index(key) {
                let index = index as usize;
                self.check_array_length(index + 1)?;
                let object = &mut *obj.borrow_mut();
                if let (false, ObjectKind::Array(items)) = (object.frozen, &mut object.kind) {
                    if index >= items.len() {
                        object.holes.extend(items.len()..index);
                        items.resize(index + 1, Value::Undefined);
                    }
                    object.holes.remove(&index);
                    items[index] = value;
                }
                return Ok(());
            }
        }

        let mut object = obj.borrow_mut();
        if object.frozen {
            return Ok(());
        }
        if matches!(object.kind, ObjectKind::Function(_)) && matches!(key, "name" | "length") {
            return Ok(());
        }
        object.properties.insert(Rc::from(key), value);
        Ok(())
    }

    pub fn delete_property(&mut self, target: &Value, key: &str) -> Eval<bool> {
        let Value::Object(obj) = target else {
            if target.is_nullish() {
                let shown = if matches!(target, Value::Null) { "null" } else { "undefined" };
                return Err(self.type_error(format!(
                    "Cannot convert undefined or null to object ({} has no property '{}')",
                    shown, key
                )));
            }
            return Ok(true);
        };
        let object = &mut *obj.borrow_mut();
        if object.frozen {
            return Ok(false);
        }
        if let ObjectKind::Array(items) = &mut object.kind {
            if key == "length" {
                return Ok(false);
            }
            if let Some(index) = array_index(key) {
                if let Some(slot) = items.get_mut(index as usize) {
                    *slot = Value::Undefined;
                    object.holes.insert(index as usize);
                }
                return Ok(true);
            }
        }
        object.remove_property(key);
        Ok(true)
    }

    /// `key in target` without the type check.
    pub fn has_property(&self, obj: &ObjectRef, key: &str) -> bool {
        {
            let object = obj.borrow();
            match &object.kind {
                ObjectKind::Array(items) => {
                    if key == "length" {
                        return true;
                    }
                    if let Some(index) = array_index(key) {
                        let index = index as usize;
                        return index < items.len() && !object.holes.contains(&index);
                    }
                }
                ObjectKind::Function(_) if matches!(key, "name" | "length") => return true,
                _ => {}
            }
        }
        lookup_property(obj, key).is_some()
    }

    /// Keys `Object.keys`, spread and `for...in` see.
    pub fn own_enumerable_keys(&self, value: &Value) -> Vec<PropertyKey> {
        match value {
            Value::Object(obj) => obj.borrow().visible_keys(),
            Value::String(s) => (0..utf16_len(s))
                .map(crate::runtime::value::index_key)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Keys `for...in` visits: enumerable keys of the object and then of its prototypes.
    /// Own keys shadow inherited ones even when the own key is not enumerable.
    fn enumerable_keys(&self, value: &Value) -> Vec<Value> {
        let Value::Object(obj) = value else {
            return self
                .own_enumerable_keys(value)
                .into_iter()
                .map(Value::String)
                .collect();
        };
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut current = Some(obj.clone());
        while let Some(object) = current {
            let object = object.borrow();
            for key in object.own_keys() {
                if seen.insert(key.clone()) && !object.is_internal_key(&key) {
                    keys.push(Value::String(key));
                }
            }
            current = object.prototype.clone();
        }
        keys
    }

    // ========================================================================
    // ITERATION
    // ========================================================================

    /// Iteration for `for...of`, spread and destructuring. Arrays are read live.
    pub fn iterator(&mut self, value: &Value, span: Span) -> Eval<ValueIter> {
        let source = match value {
            Value::String(s) => Some(Ok(chars_of(s))),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(_) => return Ok(ValueIter::Array(obj.clone(), 0)),
                ObjectKind::Set(items) => Some(Ok(items.clone())),
                ObjectKind::Map(entries) => Some(Err(entries.clone())),
                ObjectKind::Primitive(Value::String(s)) => Some(Ok(chars_of(s))),
                _ => None,
            },
            _ => None,
        };
        let items = match source {
            Some(Ok(items)) => items,
            Some(Err(entries)) => entries
                .into_iter()
                .map(|(key, value)| self.new_array(vec![key, value]))
                .collect(),
            None => return Err(self.not_iterable(value, span)),
        };
        Ok(ValueIter::List(items.into_iter()))
    }

    pub fn iterate(&mut self, value: &Value) -> Eval<Vec<Value>> {
        Ok(self.iterator(value, Span::default())?.collect())
    }

    fn not_iterable(&mut self, value: &Value, span: Span) -> Interrupt {
        let shown = if span == Span::default() {
            inspect_nested(value)
        } else {
            self.source_text(span).to_string()
        };
        let message = if value.is_nullish() {
            format!(
                "{} is not iterable (cannot read property Symbol(Symbol.iterator))",
                shown
            )
        } else {
            format!("{} is not iterable", shown)
        };
        self.type_error(message)
    }
}

enum VirtualProperty {
    Name,
    Stack,
}

fn chars_of(s: &str) -> Vec<Value> {
    s.chars().map(|c| Value::string(c.to_string())).collect()
}

/// What a function object does when called, copied out so no borrow is held across the call.
enum CallTarget {
    Closure(Rc<Closure>),
    Native(NativeFn, NativeData),
    Bound(ObjectRef, Value, Vec<Value>),
    NotCallable,
}

impl From<&Callable> for CallTarget {
    fn from(callable: &Callable) -> Self {
        match callable {
            Callable::Closure(closure) => CallTarget::Closure(closure.clone()),
            Callable::Native(native) => CallTarget::Native(native.func, native.data.clone()),
            Callable::Bound(bound) => {
                CallTarget::Bound(bound.target.clone(), bound.this.clone(), bound.args.clone())
            }
        }
    }
}

fn callable_arity(callable: &Callable) -> usize {
    match callable {
        Callable::Closure(closure) => closure.def.arity(),
        Callable::Native(native) => native.arity,
        Callable::Bound(bound) => match &bound.target.borrow().kind {
            ObjectKind::Function(inner) => callable_arity(inner).saturating_sub(bound.args.len()),
            _ => 0,
        },
    }
}

pub enum ValueIter {
    Array(ObjectRef, usize),
    List(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Array(obj, index) => {
                let item = match &obj.borrow().kind {
                    ObjectKind::Array(items) => items.get(*index).cloned(),
                    _ => None,
                };
                *index += 1;
                item
            }
            ValueIter::List(items) => items.next(),
        }
    }
}

fn copy_iteration_scope(from: &ScopeRef, parent: &ScopeRef, names: &[Name]) -> ScopeRef {
    if names.is_empty() {
        return from.clone();
    }
    let next = new_scope(ScopeKind::Block, Some(parent));
    for (name, binding) in from.borrow().copy_bindings(names) {
        next.borrow_mut().declare(name, binding.value, binding.mutable);
    }
    next
}

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

/// `===`.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// SameValueZero, used by `includes`, `Map` and `Set`.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceContext;
    use crate::runtime::output::SharedOutput;

    fn run(source: &str) -> (Vec<String>, Option<String>) {
        let source = source.to_string();
        std::thread::Builder::new()
            .stack_size(256 << 20)
            .spawn(move || {
                let output = SharedOutput::new();
                let program = crate::syntax::parse(&source, SourceContext::from_file("test.js", &source))
                    .unwrap_or_else(|e| panic!("parse failed: {}", e));
                let mut interp =
                    Interpreter::new(&source, Box::new(output.clone()), InterpreterOptions::default());
                let error = match interp.run(&program) {
                    Ok(()) => None,
                    Err(Interrupt::Throw(thrown)) => Some(crate::runtime::describe_thrown(&thrown.value)),
                    Err(other) => Some(format!("{:?}", other)),
                };
                (output.lines(), error)
            })
            .expect("spawn test thread")
            .join()
            .expect("test thread panicked")
    }

    fn lines(source: &str) -> Vec<String> {
        let (lines, error) = run(source);
        assert!(error.is_none(), "unexpected error: {:?}", error);
        lines
    }

    #[test]
    fn let_in_for_loops_is_per_iteration() {
        let out = lines(
            "const fns = [];
             for (let i = 0; i < 3; i++) { fns.push(() => i); }
             console.log(fns.map(f => f()).join(','));
             var gs = [];
             for (var j = 0; j < 3; j++) { gs.push(() => j); }
             console.log(gs.map(g => g()).join(','));",
        );
        assert_eq!(out, vec!["0,1,2", "3,3,3"]);
    }

    #[test]
    fn temporal_dead_zone_is_a_reference_error() {
        let (_, error) = run("console.log(x); let x = 1;");
        assert_eq!(error.as_deref(), Some("ReferenceError: Cannot access 'x' before initialization"));
    }

    #[test]
    fn const_reassignment_is_a_type_error() {
        let (_, error) = run("const a = 1; a = 2;");
        assert_eq!(error.as_deref(), Some("TypeError: Assignment to constant variable."));
    }

    #[test]
    fn var_and_functions_are_hoisted() {
        let out = lines("console.log(v); var v = 1; console.log(hoisted()); function hoisted() { return 'up'; }");
        assert_eq!(out, vec!["undefined", "up"]);
    }

    #[test]
    fn closures_keep_their_scope() {
        let out = lines(
            "function counter() { let n = 0; return () => ++n; }
             const next = counter(); next(); next();
             console.log(next());",
        );
        assert_eq!(out, vec!["3"]);
    }

    #[test]
    fn classes_support_inheritance_and_super() {
        let out = lines(
            "class Animal {
               constructor(name) { this.name = name; }
               speak() { return `${this.name} makes a sound`; }
               static create(name) { return new this(name); }
             }
             class Dog extends Animal {
               legs = 4;
               speak() { return super.speak() + ' (woof)'; }
             }
             const d = Dog.create('Rex');
             console.log(d.speak());
             console.log(d instanceof Animal, d.legs);
             console.log(d);",
        );
        assert_eq!(out, vec!["Rex makes a sound (woof)", "true 4", "Dog { name: 'Rex', legs: 4 }"]);
    }

    #[test]
    fn derived_constructor_must_call_super_before_this() {
        let (_, error) = run("class A {} class B extends A { constructor() { this.x = 1; super(); } } new B();");
        assert!(error.unwrap_or_default().starts_with("ReferenceError: Must call super constructor"));
    }

    #[test]
    fn class_constructors_require_new() {
        let (_, error) = run("class A {} A();");
        assert_eq!(error.as_deref(), Some("TypeError: Class constructor A cannot be invoked without 'new'"));
    }

    #[test]
    fn destructuring_with_defaults_and_rest() {
        let out = lines(
            "const { a, b: { c = 5 } = {}, ...others } = { a: 1, d: 4, e: 5 };
             const [first, , third = 'x', ...tail] = [10, 20, undefined, 40, 50];
             console.log(a, c, others, first, third, tail);",
        );
        assert_eq!(out, vec!["1 5 { d: 4, e: 5 } 10 x [ 40, 50 ]"]);
    }

    #[test]
    fn try_catch_finally_ordering() {
        let out = lines(
            "function f() { try { throw new Error('boom'); } catch (e) { console.log('caught', e.message); return 1; } finally { console.log('finally'); } }
             console.log(f());",
        );
        assert_eq!(out, vec!["caught boom", "finally", "1"]);
    }

    #[test]
    fn switch_falls_through_until_break() {
        let out = lines(
            "function kind(x) { switch (x) { case 1: case 2: return 'small'; case 3: console.log('three'); default: return 'other'; } }
             console.log(kind(2), kind(3), kind(9));",
        );
        assert_eq!(out, vec!["three", "small other other"]);
    }

    #[test]
    fn optional_chaining_short_circuits() {
        let out = lines("const o = { a: null }; console.log(o.a?.b.c, o.x?.(), o.a ?? 'fallback');");
        assert_eq!(out, vec!["undefined undefined fallback"]);
    }

    #[test]
    fn calling_a_non_function_names_the_callee() {
        let (_, error) = run("const obj = {}; obj.missing();");
        assert_eq!(error.as_deref(), Some("TypeError: obj.missing is not a function"));
    }

    #[test]
    fn runaway_recursion_is_a_range_error() {
        let (_, error) = run("function f() { return f(); } f();");
        assert_eq!(error.as_deref(), Some("RangeError: Maximum call stack size exceeded"));
    }

    #[test]
    fn arrow_functions_capture_lexical_this() {
        let out = lines(
            "const timer = { label: 't', start() { return [1].map(() => this.label); } };
             console.log(timer.start());",
        );
        assert_eq!(out, vec!["[ 't' ]"]);
    }

    #[test]
    fn frozen_objects_ignore_writes() {
        let out = lines("const o = Object.freeze({ x: 1 }); o.x = 2; o.y = 3; console.log(o, Object.isFrozen(o));");
        assert_eq!(out, vec!["{ x: 1 } true"]);
    }
}
