use crate::revision::Revision;
use crate::tag::TagId;
use crate::{TagError, Validator};

type ComputeFn<T> = Box<dyn FnMut(&mut Validator) -> T>;

/// A lazily recomputed value whose dependencies are found by autotracking.
pub struct Cache<T> {
    compute: ComputeFn<T>,
    last_value: Option<T>,
    tag: Option<TagId>,
    snapshot: Revision,
    label: Option<String>,
}

impl<T> Cache<T> {
    pub fn new(compute: impl FnMut(&mut Validator) -> T + 'static) -> Self {
        Self {
            compute: Box::new(compute),
            last_value: None,
            tag: None,
            snapshot: Revision::CONSTANT,
            label: None,
        }
    }

    /// Like [`Cache::new`]; `label` shows up in write-after-read messages.
    pub fn with_label(label: impl Into<String>, compute: impl FnMut(&mut Validator) -> T + 'static) -> Self {
        let mut cache = Self::new(compute);
        cache.label = Some(label.into());
        cache
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the cached value, recomputing first if it was never computed or any
    /// tag read by the last run changed. Either way the combined tag is consumed by
    /// the enclosing frame.
    pub fn get_value(&mut self, validator: &mut Validator) -> Result<&T, TagError> {
        let stale = match self.tag {
            None => true,
            Some(tag) => !validator.validate(tag, self.snapshot)?,
        };

        if stale {
            validator.begin_track_frame();
            let compute = &mut self.compute;
            let value = validator.run_in_transaction(self.label.as_deref(), |v| compute(v));
            let tag = validator.end_track_frame()?;
            self.last_value = Some(value);
            self.tag = Some(tag);
            self.snapshot = validator.value(tag)?;
            validator.consume(tag);
        } else if let Some(tag) = self.tag {
            validator.consume(tag);
        }

        match &self.last_value {
            Some(value) => Ok(value),
            None => Err(TagError::CacheNotComputed {
                label: self.label.clone(),
            }),
        }
    }

    /// Whether the last run read nothing that can ever change.
    pub fn is_const(&self) -> Result<bool, TagError> {
        match self.tag {
            Some(tag) => Ok(tag == TagId::CONSTANT),
            None => Err(TagError::CacheNotComputed {
                label: self.label.clone(),
            }),
        }
    }

    pub fn tag(&self) -> Option<TagId> {
        self.tag
    }
}

/// A memoized function: a [`Cache`] called like a function.
pub struct Memo<T> {
    cache: Cache<T>,
}

impl<T> Memo<T> {
    pub fn new(compute: impl FnMut(&mut Validator) -> T + 'static) -> Self {
        Self {
            cache: Cache::new(compute),
        }
    }

    pub fn call(&mut self, validator: &mut Validator) -> Result<&T, TagError> {
        self.cache.get_value(validator)
    }

    /// False until the memo has run; afterwards whether it is permanently constant.
    pub fn is_const(&self) -> bool {
        self.cache.is_const().unwrap_or(false)
    }
}
