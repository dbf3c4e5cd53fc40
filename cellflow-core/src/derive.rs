//! Derivation engine
//!
//! A derivation recomputes one output cell from a declared set of input
//! cells. It runs once at registration and again every time one of its
//! inputs is written. Two guards keep outputs sane:
//!
//! - if any input is not ready ([`CellValue::is_ready`]) the derivation is
//!   skipped and the output keeps its previous value
//! - a derivation may return `Ok(None)` to leave the output untouched
//!
//! Generator derivations (e.g. a random password) also rerun on an explicit
//! [`Store::regenerate`] call, since their output is not a function of their
//! inputs alone.

use crate::cell::{CellId, CellValue};
use crate::error::StoreError;
use crate::store::{Store, SubscriptionHandle};

type ComputeFn<V> = Box<dyn FnMut(&Inputs<'_, V>) -> Result<Option<V>, StoreError>>;

/// Whether a derivation is a pure function of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationKind {
    /// Same inputs always produce the same output.
    Pure,
    /// Output may differ between runs; rerun on demand with `regenerate`.
    Generator,
}

pub(crate) struct Derivation<V: CellValue> {
    inputs: Vec<CellId>,
    output: CellId,
    kind: DerivationKind,
    compute: Option<ComputeFn<V>>,
    handle: SubscriptionHandle,
}

impl<V: CellValue> Derivation<V> {
    fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

/// Read access to a derivation's declared inputs.
///
/// Reading any other cell fails with [`StoreError::UndeclaredInput`].
pub struct Inputs<'a, V: CellValue> {
    store: &'a Store<V>,
    declared: &'a [CellId],
    output: &'a str,
}

impl<'a, V: CellValue> Inputs<'a, V> {
    /// Current value of a declared input.
    pub fn get(&self, name: &str) -> Result<&'a V, StoreError> {
        let id = self.store.id(name)?;
        if !self.declared.contains(&id) {
            return Err(StoreError::UndeclaredInput {
                output: self.output.to_string(),
                input: name.to_string(),
            });
        }
        Ok(self.store.cell_by_id(id).value())
    }

    /// Name of the cell this derivation writes.
    pub fn output(&self) -> &str {
        self.output
    }

    /// Declared inputs as `(name, value)` pairs, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a V)> + '_ {
        let store = self.store;
        self.declared.iter().map(move |id| {
            let cell = store.cell_by_id(*id);
            (cell.name(), cell.value())
        })
    }
}

impl<V: CellValue> Store<V> {
    /// Register a pure derivation.
    ///
    /// `compute` runs immediately against the current values, writing its
    /// result to `output`, and again whenever an input is written.
    ///
    /// # Example
    ///
    /// ```
    /// use cellflow_core::Store;
    ///
    /// let mut store = Store::create([("a", 2_i64), ("b", 3), ("sum", 0)]).unwrap();
    /// store
    ///     .register(["a", "b"], "sum", |inputs| {
    ///         Ok(Some(inputs.get("a")? + inputs.get("b")?))
    ///     })
    ///     .unwrap();
    /// assert_eq!(*store.get("sum").unwrap(), 5);
    ///
    /// store.set("a", 10).unwrap();
    /// assert_eq!(*store.get("sum").unwrap(), 13);
    /// ```
    pub fn register<I, S, F>(
        &mut self,
        inputs: I,
        output: &str,
        compute: F,
    ) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&Inputs<'_, V>) -> Result<Option<V>, StoreError> + 'static,
    {
        self.install(inputs, output, DerivationKind::Pure, Box::new(compute))
    }

    /// Register a generator derivation.
    ///
    /// Behaves like [`register`](Store::register), and can additionally be
    /// rerun with [`regenerate`](Store::regenerate).
    pub fn register_generator<I, S, F>(
        &mut self,
        inputs: I,
        output: &str,
        compute: F,
    ) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&Inputs<'_, V>) -> Result<Option<V>, StoreError> + 'static,
    {
        self.install(inputs, output, DerivationKind::Generator, Box::new(compute))
    }

    /// Rerun the generator writing `output`.
    pub fn regenerate(&mut self, output: &str) -> Result<(), StoreError> {
        let id = self.id(output)?;
        let index = self
            .derivations
            .iter()
            .position(|d| d.is_active() && d.output == id && d.kind == DerivationKind::Generator)
            .ok_or_else(|| StoreError::NotAGenerator(output.to_string()))?;

        tracing::debug!(cell = %output, "regenerating");
        self.recompute_outer(index)
    }

    /// Kind of the derivation writing `output`, if any.
    pub fn derivation_kind(&self, output: &str) -> Result<Option<DerivationKind>, StoreError> {
        let id = self.id(output)?;
        Ok(self
            .derivations
            .iter()
            .find(|d| d.is_active() && d.output == id)
            .map(|d| d.kind))
    }

    fn install<I, S>(
        &mut self,
        inputs: I,
        output: &str,
        kind: DerivationKind,
        compute: ComputeFn<V>,
    ) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inputs = inputs
            .into_iter()
            .map(|name| self.id(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let output_id = self.id(output)?;

        if self
            .derivations
            .iter()
            .any(|d| d.is_active() && d.output == output_id)
        {
            return Err(StoreError::OutputTaken(output.to_string()));
        }

        let index = self.derivations.len();
        let handle = self.attach_derivation(inputs.clone(), index);
        self.derivations.push(Derivation {
            inputs,
            output: output_id,
            kind,
            compute: Some(compute),
            handle: handle.clone(),
        });
        tracing::debug!(cell = %output, ?kind, "derivation registered");

        if let Err(err) = self.recompute_outer(index) {
            handle.cancel();
            return Err(err);
        }
        Ok(())
    }

    fn recompute_outer(&mut self, index: usize) -> Result<(), StoreError> {
        let result = self.recompute(index);
        if result.is_err() {
            self.abort_pass();
        }
        result
    }

    pub(crate) fn recompute(&mut self, index: usize) -> Result<(), StoreError> {
        let Some(derivation) = self.derivations.get_mut(index) else {
            return Ok(());
        };
        if !derivation.is_active() {
            return Ok(());
        }

        let output = derivation.output;
        let declared = derivation.inputs.clone();
        let Some(mut compute) = derivation.compute.take() else {
            return Ok(());
        };

        if let Err(err) = self.enter(output) {
            self.derivations[index].compute = Some(compute);
            return Err(err);
        }

        let output_name = self.cell_by_id(output).name().to_string();
        let unready = declared
            .iter()
            .map(|id| self.cell_by_id(*id))
            .find(|cell| !cell.value().is_ready())
            .map(|cell| cell.name().to_string());

        let result = match unready {
            Some(input) => {
                tracing::debug!(cell = %output_name, input = %input, "input not ready, skipping");
                Ok(None)
            }
            None => {
                let inputs = Inputs {
                    store: &*self,
                    declared: &declared,
                    output: &output_name,
                };
                compute(&inputs)
            }
        };
        self.derivations[index].compute = Some(compute);

        match result? {
            Some(value) => {
                tracing::debug!(cell = %output_name, "derivation recomputed");
                self.write(output, value)
            }
            None => Ok(()),
        }
    }

    /// Number of registered derivations.
    pub fn derivation_count(&self) -> usize {
        self.derivations.iter().filter(|d| d.is_active()).count()
    }
}
