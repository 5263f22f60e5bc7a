use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueMap};

/// The maximum depth of scopes, includes and partials combined.
pub const MAX_RENDER_DEPTH: usize = 100;

pub(crate) struct Frame {
    pub(crate) id: usize,
    pub(crate) locals: ValueMap,
    pub(crate) current_loop: Option<Value>,
}

impl Frame {
    fn new(id: usize) -> Frame {
        Frame {
            id,
            locals: ValueMap::default(),
            current_loop: None,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        m.entries(self.locals.iter());
        if let Some(ref current_loop) = self.current_loop {
            m.entry(&"forloop", current_loop);
        }
        m.finish()
    }
}

/// The scope stack of a render.
///
/// The first frame is the root scope, `assign` and `capture` write there.
/// Tags that introduce bindings push frames on top of it.  After the scopes
/// the counters of `increment`/`decrement` are consulted and then the
/// assigns the render was invoked with.
pub(crate) struct Context {
    frames: Vec<Frame>,
    next_frame_id: usize,
    base_depth: usize,
    counters: ValueMap,
    assigns: Value,
    memo: RefCell<HashMap<(usize, String), Value>>,
    disabled_tags: Vec<String>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("frames", &self.frames)
            .field("counters", &self.counters)
            .field("assigns", &self.assigns)
            .field("disabled_tags", &self.disabled_tags)
            .finish()
    }
}

impl Context {
    /// Creates a context with a root scope.
    ///
    /// `base_depth` is the depth of the context this one is isolated from.
    pub fn new(assigns: Value, base_depth: usize) -> Context {
        Context {
            frames: vec![Frame::new(0)],
            next_frame_id: 1,
            base_depth,
            counters: ValueMap::default(),
            assigns,
            memo: RefCell::default(),
            disabled_tags: Vec::new(),
        }
    }

    /// The nesting depth including the depth of parent contexts.
    pub fn depth(&self) -> usize {
        self.base_depth + self.frames.len()
    }

    pub fn check_depth(&self) -> Result<(), Error> {
        if self.depth() > MAX_RENDER_DEPTH {
            Err(Error::new(ErrorKind::StackLevel, "Nesting too deep"))
        } else {
            Ok(())
        }
    }

    /// Pushes a new scope.
    pub fn push_frame(&mut self) -> Result<(), Error> {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.frames.push(Frame::new(id));
        if let Err(err) = self.check_depth() {
            self.frames.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Pops the innermost scope.  The root scope cannot be popped.
    pub fn pop_frame(&mut self) -> Result<(), Error> {
        if self.frames.len() <= 1 {
            return Err(Error::new(
                ErrorKind::ContextError,
                "cannot pop the root scope",
            ));
        }
        if let Some(frame) = self.frames.pop() {
            self.memo.borrow_mut().retain(|(id, _), _| *id != frame.id);
        }
        Ok(())
    }

    /// Sets a variable in the innermost scope.
    pub fn set_local(&mut self, name: &str, value: Value) {
        let frame_id = match self.frames.last() {
            Some(frame) => frame.id,
            None => return,
        };
        self.forget(frame_id, name);
        if let Some(frame) = self.frames.last_mut() {
            frame.locals.insert(name.into(), value);
        }
    }

    /// Sets a variable in the root scope.
    pub fn set_root(&mut self, name: &str, value: Value) {
        self.forget(0, name);
        self.frames[0].locals.insert(name.into(), value);
    }

    fn forget(&self, frame_id: usize, name: &str) {
        let mut memo = self.memo.borrow_mut();
        if memo.is_empty() {
            return;
        }
        memo.retain(|(id, path), _| {
            *id != frame_id
                || !(path == name
                    || (path.starts_with(name) && path[name.len()..].starts_with('.')))
        });
    }

    /// Finds a name in the scopes and counters.
    ///
    /// Returns the identity of the frame the value was found in.
    pub fn find(&self, name: &str) -> Option<(usize, &Value)> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.locals.get(name) {
                return Some((frame.id, value));
            }
        }
        self.counters.get(name).map(|value| (0, value))
    }

    /// The values the render was invoked with.
    pub fn assigns(&self) -> &Value {
        &self.assigns
    }

    /// Reads a counter of `increment`/`decrement`.
    pub fn counter(&self, name: &str) -> Option<&Value> {
        self.counters.get(name)
    }

    pub fn set_counter(&mut self, name: &str, value: Value) {
        self.forget(0, name);
        self.counters.insert(name.into(), value);
    }

    pub fn memo_get(&self, frame_id: usize, path: &str) -> Option<Value> {
        self.memo
            .borrow()
            .get(&(frame_id, path.to_string()))
            .cloned()
    }

    pub fn memo_insert(&self, frame_id: usize, path: String, value: Value) {
        self.memo.borrow_mut().insert((frame_id, path), value);
    }

    /// Attaches a loop drop to the innermost scope.
    pub fn set_current_loop(&mut self, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.current_loop = Some(value);
        }
    }

    /// Returns the innermost loop drop.
    pub fn current_loop(&self) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.current_loop.as_ref())
    }

    /// Disables tags and returns the marker to restore the previous set.
    pub fn disable_tags(&mut self, tags: &[&str]) -> usize {
        let marker = self.disabled_tags.len();
        self.disabled_tags
            .extend(tags.iter().map(|tag| tag.to_string()));
        marker
    }

    pub fn restore_disabled_tags(&mut self, marker: usize) {
        self.disabled_tags.truncate(marker);
    }

    pub fn is_tag_disabled(&self, name: &str) -> bool {
        self.disabled_tags.iter().any(|tag| tag == name)
    }
}

/// Values shared by all contexts of a render.
///
/// Tags keep state here that has to survive isolated partials, for instance
/// the positions of `cycle` groups and the offsets for `offset: continue`.
/// Hosts can pass their own registers in through
/// [`RenderOptions`](crate::RenderOptions).
#[derive(Debug, Default)]
pub struct Registers {
    values: Mutex<BTreeMap<String, Value>>,
}

impl Registers {
    /// Creates empty registers.
    pub fn new() -> Registers {
        Registers::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        // a panicking filter must not take the counters down with it
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a register.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Sets a register.
    pub fn set(&self, key: &str, value: Value) {
        self.lock().insert(key.to_string(), value);
    }

    /// Updates a register in place.
    pub fn update<F: FnOnce(Option<Value>) -> Value>(&self, key: &str, f: F) -> Value {
        let mut values = self.lock();
        let rv = f(values.remove(key));
        values.insert(key.to_string(), rv.clone());
        rv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_scopes() {
        let mut ctx = Context::new(Value::UNDEFINED, 0);
        ctx.set_root("a", Value::from(1));
        ctx.push_frame().unwrap();
        ctx.set_local("a", Value::from(2));
        ctx.set_local("b", Value::from(3));
        assert_eq!(ctx.find("a").map(|x| x.1.clone()), Some(Value::from(2)));
        ctx.pop_frame().unwrap();
        assert_eq!(ctx.find("a").map(|x| x.1.clone()), Some(Value::from(1)));
        assert!(ctx.find("b").is_none());
        let err = ctx.pop_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContextError);
    }

    #[test]
    fn test_depth_limit() {
        let mut ctx = Context::new(Value::UNDEFINED, MAX_RENDER_DEPTH - 2);
        ctx.push_frame().unwrap();
        let err = ctx.push_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackLevel);
        assert_eq!(ctx.depth(), MAX_RENDER_DEPTH);
    }

    #[test]
    fn test_memo_dropped_with_frame() {
        let mut ctx = Context::new(Value::UNDEFINED, 0);
        ctx.push_frame().unwrap();
        ctx.memo_insert(1, "x.y".into(), Value::from(1));
        ctx.memo_insert(0, "x".into(), Value::from(2));
        assert!(ctx.memo_get(1, "x.y").is_some());
        ctx.pop_frame().unwrap();
        assert!(ctx.memo_get(1, "x.y").is_none());
        assert!(ctx.memo_get(0, "x").is_some());
        ctx.set_root("x", Value::from(3));
        assert!(ctx.memo_get(0, "x").is_none());
    }

    #[test]
    fn test_registers() {
        let registers = Registers::new();
        let rv = registers.update("cycle", |old| {
            Value::from(old.and_then(|x| x.as_i64()).unwrap_or(0) + 1)
        });
        assert_eq!(rv, Value::from(1));
        assert_eq!(registers.get("cycle"), Some(Value::from(1)));
    }

    #[test]
    fn test_registers_survive_panicking_update() {
        let registers = Registers::new();
        registers.set("counter", Value::from(41));
        let rv = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registers.update("other", |_| panic!("boom"));
        }));
        assert!(rv.is_err());
        assert!(registers.values.is_poisoned());
        assert_eq!(registers.get("counter"), Some(Value::from(41)));
        let rv = registers.update("counter", |old| {
            Value::from(old.and_then(|x| x.as_i64()).unwrap_or(0) + 1)
        });
        assert_eq!(rv, Value::from(42));
        registers.set("fresh", Value::from(true));
        assert_eq!(registers.get("fresh"), Some(Value::from(true)));
    }
}
