mod pipe;

use crate::{
    compile::{
        tree::{Base, Block, Origin, Partial, Path, Tree},
        Program, Scope,
    },
    log::{error_partial_depth, error_write, Diagnostic, UNREGISTERED_PARTIAL},
};
use pipe::Pipe;
use serde_json::Value;
use std::{borrow::Cow, cell::Cell, fmt::Write};

/// Deepest partial nesting a render may reach.
pub const PARTIAL_DEPTH_LIMIT: usize = 64;

/// A [`Program`] that was checked to be invocable.
///
/// Binding verifies that every partial the program includes is present in
/// its partial table, so rendering never has to look anything up outside
/// the program.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderer {
    program: Program,
}

impl Renderer {
    /// Bind a [`Program`], turning it into a [`Renderer`].
    ///
    /// # Errors
    ///
    /// Returns a reason when the program includes partials it does not carry.
    pub fn bind(program: Program) -> Result<Self, String> {
        let missing = program.missing_partials();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|name| format!("`{name}`"))
                .collect::<Vec<_>>()
                .join(", ");

            return Err(format!("the program includes unknown partials {names}"));
        }

        Ok(Self { program })
    }

    /// Return the bound [`Program`].
    #[inline]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Render the bound program with the given data.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] when partials nest deeper than
    /// [`PARTIAL_DEPTH_LIMIT`], or writing to the buffer fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::{compile, Renderer};
    /// use serde_json::json;
    /// use std::collections::BTreeMap;
    ///
    /// let program = compile("Hello {{name}}!", &BTreeMap::new()).unwrap();
    /// let renderer = Renderer::bind(program).unwrap();
    ///
    /// let output = renderer.render(&json!({ "name": "<world>" }));
    /// assert_eq!(output.unwrap(), "Hello &lt;world&gt;!");
    /// ```
    pub fn render(&self, data: &Value) -> Result<String, Diagnostic> {
        let walker = Walker {
            program: &self.program,
            root: data,
            depth: Cell::new(0),
        };
        let context = Context {
            value: data,
            parent: None,
            locals: None,
        };

        let mut buffer = String::new();
        let mut pipe = Pipe::new(&mut buffer);
        walker.render_scope(&self.program.scope, &context, &mut pipe)?;

        Ok(buffer)
    }
}

/// Data variables of the innermost `#each` iteration.
#[derive(Debug, Clone, Copy)]
struct Locals<'c> {
    index: usize,
    key: Option<&'c str>,
    first: bool,
    last: bool,
}

/// A context value, linked to the context it was entered from.
#[derive(Debug, Clone, Copy)]
struct Context<'c> {
    value: &'c Value,
    parent: Option<&'c Context<'c>>,
    locals: Option<Locals<'c>>,
}

impl<'c> Context<'c> {
    /// Enter the given value, keeping the current iteration variables.
    fn child<'v>(&'v self, value: &'v Value) -> Context<'v> {
        Context {
            value,
            parent: Some(self),
            locals: self.locals,
        }
    }
}

/// Walks the trees of a [`Program`] for a single render.
struct Walker<'a> {
    program: &'a Program,
    root: &'a Value,
    /// Current partial nesting.
    depth: Cell<usize>,
}

impl<'a> Walker<'a> {
    /// Render the given [`Scope`].
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] if any of the [`Tree`] instances in the
    /// `Scope` cannot be rendered.
    fn render_scope<'c>(
        &self,
        scope: &'a Scope,
        context: &Context<'c>,
        pipe: &mut Pipe,
    ) -> Result<(), Diagnostic>
    where
        'a: 'c,
    {
        for tree in &scope.data {
            match tree {
                Tree::Raw(raw) => pipe.write_str(raw).map_err(|_| error_write())?,
                Tree::Output(output) => {
                    let value = self.evaluate_base(&output.base, context);
                    pipe.write_value(&value, output.escape)
                        .map_err(|_| error_write())?
                }
                Tree::Condition(condition) => {
                    let value = self.evaluate_base(&condition.base, context);
                    if is_truthy(&value) != condition.negate {
                        self.render_scope(&condition.then_branch, context, pipe)?;
                    } else if let Some(else_branch) = &condition.else_branch {
                        self.render_scope(else_branch, context, pipe)?;
                    }
                }
                Tree::With(block) => {
                    let value = self.evaluate_base(&block.base, context);
                    if is_truthy(&value) {
                        let child = context.child(&value);
                        self.render_scope(&block.then_branch, &child, pipe)?;
                    } else if let Some(else_branch) = &block.else_branch {
                        self.render_scope(else_branch, context, pipe)?;
                    }
                }
                Tree::Each(block) => self.render_each(block, context, pipe)?,
                Tree::Partial(partial) => self.render_partial(partial, context, pipe)?,
            }
        }

        Ok(())
    }

    /// Render the body of an `#each` block once per item, or the else
    /// branch if there are no items.
    fn render_each<'c>(
        &self,
        block: &'a Block,
        context: &Context<'c>,
        pipe: &mut Pipe,
    ) -> Result<(), Diagnostic>
    where
        'a: 'c,
    {
        let value = self.evaluate_base(&block.base, context);
        let rendered = match value.as_ref() {
            Value::Array(items) if !items.is_empty() => {
                for (index, item) in items.iter().enumerate() {
                    let locals = Locals {
                        index,
                        key: None,
                        first: index == 0,
                        last: index + 1 == items.len(),
                    };
                    let child = Context {
                        value: item,
                        parent: Some(context),
                        locals: Some(locals),
                    };
                    self.render_scope(&block.then_branch, &child, pipe)?;
                }
                true
            }
            Value::Object(map) if !map.is_empty() => {
                for (index, (key, item)) in map.iter().enumerate() {
                    let locals = Locals {
                        index,
                        key: Some(key),
                        first: index == 0,
                        last: index + 1 == map.len(),
                    };
                    let child = Context {
                        value: item,
                        parent: Some(context),
                        locals: Some(locals),
                    };
                    self.render_scope(&block.then_branch, &child, pipe)?;
                }
                true
            }
            _ => false,
        };

        match &block.else_branch {
            Some(else_branch) if !rendered => self.render_scope(else_branch, context, pipe),
            _ => Ok(()),
        }
    }

    /// Render an included partial, with its own context if one was given.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] if the partial nests deeper than
    /// [`PARTIAL_DEPTH_LIMIT`], or fails to render.
    fn render_partial<'c>(
        &self,
        partial: &'a Partial,
        context: &Context<'c>,
        pipe: &mut Pipe,
    ) -> Result<(), Diagnostic>
    where
        'a: 'c,
    {
        let name = partial.name.as_str();
        let Some(scope) = self.program.partial(name) else {
            return Err(Diagnostic::build(UNREGISTERED_PARTIAL)
                .with_help(format!("the partial `{name}` is missing from the program")));
        };

        let depth = self.depth.get();
        if depth >= PARTIAL_DEPTH_LIMIT {
            return Err(error_partial_depth(name, PARTIAL_DEPTH_LIMIT));
        }
        self.depth.set(depth + 1);

        let result = match &partial.context {
            Some(base) => {
                let value = self.evaluate_base(base, context);
                let child = context.child(&value);
                self.render_scope(scope, &child, pipe)
            }
            None => self.render_scope(scope, context, pipe),
        };
        self.depth.set(depth);

        result.map_err(|diagnostic| diagnostic.with_name(name))
    }

    /// Evaluate a [`Base`] to return a [`Value`].
    ///
    /// Missing values evaluate to `Value::Null`.
    fn evaluate_base<'c>(&self, base: &'a Base, context: &Context<'c>) -> Cow<'c, Value>
    where
        'a: 'c,
    {
        match base {
            Base::Literal(value) => Cow::Borrowed(value),
            Base::Variable(path) => self.evaluate_path(path, context),
        }
    }

    /// Evaluate a [`Path`] to return a [`Value`] from the context chain
    /// or the data variables.
    fn evaluate_path<'c>(&self, path: &Path, context: &Context<'c>) -> Cow<'c, Value>
    where
        'a: 'c,
    {
        let start: Cow<'c, Value> = match &path.origin {
            Origin::Context { parents } => {
                let mut current = context;
                for _ in 0..*parents {
                    match current.parent {
                        Some(parent) => current = parent,
                        None => break,
                    }
                }
                Cow::Borrowed(current.value)
            }
            Origin::Data(name) => {
                let locals = context.locals;
                match name.as_str() {
                    "root" => Cow::Borrowed(self.root),
                    "index" => Cow::Owned(locals.map_or(Value::Null, |l| Value::from(l.index))),
                    "key" => Cow::Owned(
                        locals
                            .and_then(|l| l.key)
                            .map_or(Value::Null, Value::from),
                    ),
                    "first" => Cow::Owned(locals.map_or(Value::Null, |l| Value::Bool(l.first))),
                    "last" => Cow::Owned(locals.map_or(Value::Null, |l| Value::Bool(l.last))),
                    _ => Cow::Owned(Value::Null),
                }
            }
        };

        path.keys
            .iter()
            .fold(start, |value, key| lookup(value, key))
    }
}

/// Return the member of the value with the given key.
fn lookup<'c>(value: Cow<'c, Value>, key: &str) -> Cow<'c, Value> {
    match value {
        Cow::Borrowed(value) => match member(value, key) {
            Some(found) => Cow::Borrowed(found),
            None => Cow::Owned(computed(value, key)),
        },
        Cow::Owned(value) => Cow::Owned(
            member(&value, key)
                .cloned()
                .unwrap_or_else(|| computed(&value, key)),
        ),
    }
}

/// Return an object field or an array item by position.
fn member<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Return a property that is derived rather than stored, `length` of an
/// array or string, or null.
fn computed(value: &Value, key: &str) -> Value {
    match (value, key) {
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::String(string), "length") => Value::from(string.encode_utf16().count()),
        _ => Value::Null,
    }
}

/// Return true if the given [`Value`] is truthy.
///
/// `false`, `null`, `0`, the empty string and the empty array are falsy,
/// everything else is truthy, including the empty object.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(bool) => *bool,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(string) => !string.is_empty(),
        Value::Array(array) => !array.is_empty(),
        Value::Object(_) => true,
        Value::Null => false,
    }
}
