//! Data flow between tasks.
//!
//! A bound task does not receive its input from the caller. It declares a
//! partial input type `P` and a list of injections, each copying one
//! upstream task's output into `P`. Right before the bound task runs, the
//! injections are applied in order and `P::reduce` turns the partial value
//! into the real input, or reports which required field never arrived.
//!
//! Bindings carry values only. They do not order anything: every source
//! must also be declared as a dependency of the bound task, and the queue
//! refuses to run a graph where that is not the case.

use crate::core::handle::TaskHandle;
use crate::core::task::TaskId;
use crate::error::{Error, Result};

/// A field-by-field accumulator for a task input.
pub trait PartialInput: Default + Send + 'static {
    type Output: Send + 'static;

    /// Produce the complete input, or `Error::MissingInput` naming the
    /// first required field that is still empty.
    fn reduce(self) -> Result<Self::Output>;
}

/// Partial input with a single required value.
#[derive(Debug)]
pub struct Required<T>(pub Option<T>);

impl<T> Default for Required<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T: Send + 'static> PartialInput for Required<T> {
    type Output = T;

    fn reduce(self) -> Result<T> {
        self.0.ok_or(Error::MissingInput { field: "input" })
    }
}

type Injection<P> = Box<dyn FnOnce(&mut P) + Send>;

pub struct Bindings<P> {
    sources: Vec<TaskId>,
    injections: Vec<Injection<P>>,
}

impl<P: PartialInput> Bindings<P> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            injections: Vec::new(),
        }
    }

    /// Inject `source`'s output into the partial input.
    ///
    /// `assign` receives the output by value and may store it in one field
    /// or reshape it across several (e.g. split a pair into two fields). If
    /// the source produced no output, `assign` is never called.
    pub fn inject<T, F>(mut self, source: &TaskHandle<T>, assign: F) -> Self
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut P, T) + Send + 'static,
    {
        let handle = source.clone();
        self.sources.push(source.id());
        self.injections.push(Box::new(move |partial: &mut P| {
            if let Some(output) = handle.output() {
                assign(partial, output);
            }
        }));
        self
    }

    /// Ids of every task this binding reads from.
    pub fn sources(&self) -> &[TaskId] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.injections.is_empty()
    }

    /// Apply every injection and reduce.
    pub fn resolve(self) -> Result<P::Output> {
        let mut partial = P::default();
        for inject in self.injections {
            inject(&mut partial);
        }
        partial.reduce()
    }
}

impl<T: Clone + Send + 'static> Bindings<Required<T>> {
    /// Bind a task's input to exactly one upstream output.
    pub fn from_output(source: &TaskHandle<T>) -> Self {
        Self::new().inject(source, |partial: &mut Required<T>, output| {
            partial.0 = Some(output)
        })
    }
}

impl<P: PartialInput> Default for Bindings<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for Bindings<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bindings")
            .field("sources", &self.sources)
            .finish()
    }
}
