use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::schema::{Check, FieldKey, FieldSpec, FieldType, normalize_number};
use super::validation::{ValidationError, is_email};

/// A predicate that brands values of `Base` once they pass [`check`](Self::check).
pub trait Refinement: Send + Sync + 'static {
    type Base: FieldType;

    /// Noun phrase used in rejection messages, e.g. "a positive integer".
    const NAME: &'static str;

    fn check(base: &Self::Base) -> Result<(), ValidationError>;
}

/// A `Base` value that has passed `R`. The only ways in are [`Refined::new`]
/// and deserialization, both of which run the check.
pub struct Refined<R: Refinement> {
    value: R::Base,
    marker: PhantomData<fn() -> R>,
}

impl<R: Refinement> Refined<R> {
    pub fn new(value: R::Base) -> Result<Self, ValidationError> {
        R::check(&value)?;
        Ok(Self {
            value,
            marker: PhantomData,
        })
    }

    pub fn get(&self) -> &R::Base {
        &self.value
    }

    pub fn into_inner(self) -> R::Base {
        self.value
    }
}

impl<R: Refinement> Deref for Refined<R> {
    type Target = R::Base;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<R> Clone for Refined<R>
where
    R: Refinement,
    R::Base: Clone,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            marker: PhantomData,
        }
    }
}

impl<R> Debug for Refined<R>
where
    R: Refinement,
    R::Base: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Refined").field(&self.value).finish()
    }
}

impl<R> PartialEq for Refined<R>
where
    R: Refinement,
    R::Base: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<R: Refinement> Serialize for Refined<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, R: Refinement> Deserialize<'de> for Refined<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = R::Base::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

impl<R: Refinement> FieldType for Refined<R> {
    fn field_spec(key: FieldKey) -> FieldSpec {
        R::Base::field_spec(key).check(Check::Refinement {
            name: R::NAME,
            check: check_refined::<R>,
        })
    }
}

fn check_refined<R: Refinement>(value: &Value) -> Result<(), ValidationError> {
    let base = serde_json::from_value::<R::Base>(normalize_number(value.clone()))
        .map_err(|_| ValidationError::new(format!("must be {}", R::NAME)))?;
    R::check(&base)
}

#[derive(Clone, Copy, Debug)]
pub struct EmailAddress;

impl Refinement for EmailAddress {
    type Base = String;
    const NAME: &'static str = "a valid email address";

    fn check(base: &String) -> Result<(), ValidationError> {
        if is_email(base) {
            Ok(())
        } else {
            Err(ValidationError::new("must be a valid email address"))
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NonEmpty;

impl Refinement for NonEmpty {
    type Base = String;
    const NAME: &'static str = "non-empty text";

    fn check(base: &String) -> Result<(), ValidationError> {
        if base.trim().is_empty() {
            Err(ValidationError::new("must not be empty"))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PositiveInteger;

impl Refinement for PositiveInteger {
    type Base = u64;
    const NAME: &'static str = "a positive integer";

    fn check(base: &u64) -> Result<(), ValidationError> {
        if *base > 0 {
            Ok(())
        } else {
            Err(ValidationError::new("must be a positive integer"))
        }
    }
}

pub type Email = Refined<EmailAddress>;
