use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::{FitnessFunction, Result};

/// Per-chromosome memo of fitness values keyed by fitness function identity.
///
/// Two fitness functions are the same key only if they share an allocation,
/// mirroring how chromosomes themselves are compared.
#[derive(Clone, Debug, Default)]
pub struct FitnessCache {
    values: RefCell<HashMap<usize, f64>>,
}

fn key<C>(function: &Rc<dyn FitnessFunction<C>>) -> usize {
    Rc::as_ptr(function) as *const () as usize
}

impl FitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<C>(&self, function: &Rc<dyn FitnessFunction<C>>) -> Option<f64> {
        self.values.borrow().get(&key(function)).copied()
    }

    /// Returns the cached value or computes and stores it. Errors are not cached.
    pub fn get_or_compute<C, F>(&self, function: &Rc<dyn FitnessFunction<C>>, compute: F) -> Result<f64>
    where
        F: FnOnce() -> Result<f64>,
    {
        if let Some(value) = self.get(function) {
            return Ok(value);
        }
        let value = compute()?;
        self.values.borrow_mut().insert(key(function), value);
        Ok(value)
    }

    pub fn insert<C>(&self, function: &Rc<dyn FitnessFunction<C>>, value: f64) {
        self.values.borrow_mut().insert(key(function), value);
    }

    pub fn remove<C>(&self, function: &Rc<dyn FitnessFunction<C>>) {
        self.values.borrow_mut().remove(&key(function));
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}
