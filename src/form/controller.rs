use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::{FieldKey, FieldLens, FormModel, FormSchema, normalize_number};
use super::validation::{FieldStatus, FormValues};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a form instance, only used for binding ids and logs.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(transparent)]
pub struct FormId(String);

impl FormId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn next() -> Self {
        Self(format!(
            "form-{}",
            FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

/// What to do with incoming keys that are not fields of the model.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFields {
    #[default]
    Discard,
    Error,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormOptions {
    pub form_id: Option<FormId>,
    /// Policy applied by [`FormController::set`].
    pub unknown_fields: UnknownFields,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetOptions {
    pub unknown_fields: UnknownFields,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMeta {
    pub touched: bool,
    pub dirty: bool,
    pub status: FieldStatus,
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub form_id: FormId,
    pub values: FormValues,
    pub errors: BTreeMap<FieldKey, FieldStatus>,
    pub field_meta: BTreeMap<FieldKey, FieldMeta>,
    pub initialized: bool,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("unknown form field `{0}`")]
    UnknownField(String),
    #[error("duplicate form field `{0}`")]
    DuplicateField(FieldKey),
    #[error("form values must be an object, got {0}")]
    NotAnObject(&'static str),
    #[error("form values have not passed validation")]
    NotValidated,
    #[error("failed to convert form values: {0}")]
    Conversion(String),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("submit handler failed: {0}")]
    SubmitFailed(String),
}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone, Debug)]
struct Seed {
    values: FormValues,
    meta: BTreeMap<FieldKey, FieldMeta>,
}

pub(super) struct FormState {
    pub(super) values: FormValues,
    pub(super) field_meta: BTreeMap<FieldKey, FieldMeta>,
    pub(super) initialized: bool,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) sequence: ValidationTicket,
    pub(super) pending: Option<ValidationTicket>,
    pub(super) validated: Option<ValidationTicket>,
    seed: Option<Seed>,
}

impl FormState {
    fn new() -> Self {
        Self {
            values: FormValues::new(),
            field_meta: BTreeMap::new(),
            initialized: false,
            submit_state: SubmitState::Idle,
            submit_count: 0,
            sequence: ValidationTicket(0),
            pending: None,
            validated: None,
            seed: None,
        }
    }

    pub(super) fn ensure_meta(&mut self, key: FieldKey) -> &mut FieldMeta {
        self.field_meta.entry(key).or_default()
    }

    /// Invalidates every validation started before this call.
    pub(super) fn advance(&mut self) -> ValidationTicket {
        self.sequence = ValidationTicket(self.sequence.0 + 1);
        self.validated = None;
        self.sequence
    }

    fn write_value(&mut self, key: FieldKey, value: Value) {
        if value.is_null() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
    }

    fn refresh_dirty(&mut self, key: FieldKey) {
        let seeded = self.seed.as_ref().and_then(|seed| seed.values.get(&key));
        let dirty = self.values.get(&key) != seeded;
        self.ensure_meta(key).dirty = dirty;
    }

    fn capture_seed(&mut self) {
        for meta in self.field_meta.values_mut() {
            meta.dirty = false;
        }
        self.seed = Some(Seed {
            values: self.values.clone(),
            meta: self.field_meta.clone(),
        });
    }
}

/// Live state of one form instance.
///
/// `T` is the strict shape produced by [`FormController::get_strict`] once
/// validation succeeds. Clones share the same state.
pub struct FormController<T> {
    pub(super) form_id: FormId,
    pub(super) options: FormOptions,
    pub(super) model: Arc<FormModel>,
    pub(super) state: Arc<RwLock<FormState>>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FormController<T> {
    fn clone(&self) -> Self {
        Self {
            form_id: self.form_id.clone(),
            options: self.options.clone(),
            model: self.model.clone(),
            state: self.state.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> FormController<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(model: impl Into<Arc<FormModel>>, options: FormOptions) -> Self {
        let form_id = options.form_id.clone().unwrap_or_else(FormId::next);
        Self {
            form_id,
            options,
            model: model.into(),
            state: Arc::new(RwLock::new(FormState::new())),
            marker: PhantomData,
        }
    }

    pub fn from_schema(options: FormOptions) -> FormResult<Self>
    where
        T: FormSchema,
    {
        Ok(Self::new(T::model()?, options))
    }

    pub fn form_id(&self) -> &FormId {
        &self.form_id
    }

    pub fn model(&self) -> &FormModel {
        &self.model
    }

    pub fn is_initialized(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading initialized flag")?.initialized)
    }

    /// Lenient seed: merges `partial` into the current values without
    /// validating. Keys that are not fields follow
    /// [`FormOptions::unknown_fields`].
    pub fn set(&self, partial: impl Serialize) -> FormResult<()> {
        let object = into_object(partial)?;
        self.merge(object, self.options.unknown_fields, false)
    }

    /// Like [`set`](Self::set) with an explicit unknown-field policy. Supplied
    /// fields become eligible for error display.
    pub fn set_strict(&self, values: impl Serialize, options: SetOptions) -> FormResult<()> {
        let object = into_object(values)?;
        self.merge(object, options.unknown_fields, true)
    }

    fn merge(
        &self,
        object: Map<String, Value>,
        policy: UnknownFields,
        mark_touched: bool,
    ) -> FormResult<()> {
        let mut updates = Vec::with_capacity(object.len());
        for (name, value) in object {
            match self.model.lookup(&name) {
                Some(key) => updates.push((key, value)),
                None if policy == UnknownFields::Error => {
                    return Err(FormError::UnknownField(name));
                }
                None => {
                    tracing::debug!(form_id = %self.form_id, field = %name, "dropping unknown form field");
                }
            }
        }

        let mut state = write_lock(&self.state, "seeding form values")?;
        let seeded = updates.len();
        for (key, value) in updates {
            state.write_value(key, value);
            let meta = state.ensure_meta(key);
            meta.status = FieldStatus::Unvalidated;
            meta.touched |= mark_touched;
        }
        state.initialized = true;
        state.advance();
        state.capture_seed();
        tracing::debug!(form_id = %self.form_id, seeded, strict = mark_touched, "seeded form values");
        Ok(())
    }

    /// Field change event from the rendering side.
    pub fn change(&self, field: impl Into<FieldKey>, value: Value) -> FormResult<()> {
        let key = self.known_key(field.into())?;
        let mut state = write_lock(&self.state, "writing field value")?;
        state.write_value(key, value);
        state.refresh_dirty(key);
        let meta = state.ensure_meta(key);
        meta.touched = true;
        meta.status = FieldStatus::Unvalidated;
        state.advance();
        Ok(())
    }

    pub fn set_field<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let value =
            serde_json::to_value(value).map_err(|error| FormError::Conversion(error.to_string()))?;
        self.change(lens.key(), value)
    }

    pub fn touch(&self, field: impl Into<FieldKey>) -> FormResult<()> {
        let key = self.known_key(field.into())?;
        write_lock(&self.state, "touching field")?
            .ensure_meta(key)
            .touched = true;
        Ok(())
    }

    /// Current base values. Nothing is validated here.
    pub fn get(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading form values")?.values.clone())
    }

    /// The strict shape, available only while the last [`valid`](Self::valid)
    /// call accepted the current values.
    pub fn get_strict(&self) -> FormResult<T> {
        let values = {
            let state = read_lock(&self.state, "reading validated values")?;
            if state.validated != Some(state.sequence) {
                return Err(FormError::NotValidated);
            }
            state.values.clone()
        };
        strict_from_values(values)
    }

    pub fn field_value<L>(&self, lens: L) -> FormResult<Option<L::Value>>
    where
        L: FieldLens<T>,
    {
        let value = read_lock(&self.state, "reading field value")?
            .values
            .get(&lens.key())
            .cloned();
        value
            .map(|value| {
                serde_json::from_value(normalize_number(value))
                    .map_err(|error| FormError::Conversion(error.to_string()))
            })
            .transpose()
    }

    /// Restores the state captured by the last `set`/`set_strict`: values,
    /// statuses and touched flags. Nothing is dirty afterwards.
    pub fn reset(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "resetting form")?;
        match state.seed.clone() {
            Some(seed) => {
                state.values = seed.values;
                state.field_meta = seed.meta;
            }
            None => {
                state.values.clear();
                state.field_meta.clear();
            }
        }
        state.submit_state = SubmitState::Idle;
        state.pending = None;
        state.advance();
        Ok(())
    }

    /// Validates the form and, when it is valid, hands the strict values to
    /// `handler`. Resolves `false` when validation rejected the form.
    pub async fn submit<F, Fut>(&self, handler: F) -> FormResult<bool>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = FormResult<()>>,
    {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if matches!(
                state.submit_state,
                SubmitState::Validating | SubmitState::Submitting
            ) {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
        }

        let is_valid = match self.valid().await {
            Ok(is_valid) => is_valid,
            Err(error) => {
                self.abort_submit();
                return Err(error);
            }
        };
        let strict = match is_valid {
            true => match self.get_strict() {
                Ok(strict) => Some(strict),
                Err(FormError::NotValidated) => None,
                Err(error) => {
                    self.abort_submit();
                    return Err(error);
                }
            },
            false => None,
        };
        let Some(strict) = strict else {
            self.finish_submit(SubmitState::Failed)?;
            return Ok(false);
        };

        {
            let mut state = write_lock(&self.state, "moving submit state to submitting")?;
            if state.submit_state != SubmitState::Validating {
                return Ok(false);
            }
            transition_submit_state(&mut state, SubmitState::Submitting)?;
        }
        tracing::debug!(form_id = %self.form_id, "submitting form");
        let submit_result = handler(strict).await;

        let next = match submit_result {
            Ok(()) => SubmitState::Succeeded,
            Err(_) => SubmitState::Failed,
        };
        self.finish_submit(next)?;
        submit_result.map(|()| true)
    }

    // Error paths recover a poisoned lock so the submit never stays stuck.
    fn abort_submit(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.submit_state == SubmitState::Idle {
            return;
        }
        if let Err(error) = transition_submit_state(&mut state, SubmitState::Failed) {
            tracing::warn!(form_id = %self.form_id, %error, "could not mark submit failed");
        }
    }

    // A reset while the submit was running wins.
    fn finish_submit(&self, next: SubmitState) -> FormResult<()> {
        let mut state = write_lock(&self.state, "completing submit")?;
        if state.submit_state == SubmitState::Idle {
            return Ok(());
        }
        transition_submit_state(&mut state, next)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            form_id: self.form_id.clone(),
            values: state.values.clone(),
            errors: state
                .field_meta
                .iter()
                .map(|(key, meta)| (*key, meta.status.clone()))
                .collect(),
            field_meta: state.field_meta.clone(),
            initialized: state.initialized,
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_dirty: state.field_meta.values().any(|meta| meta.dirty),
            is_valid: state.validated == Some(state.sequence),
            is_validating: state.pending == Some(state.sequence),
        })
    }

    pub fn field_meta(&self, field: impl Into<FieldKey>) -> FormResult<Option<FieldMeta>> {
        let key = self.known_key(field.into())?;
        Ok(read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(&key)
            .cloned())
    }

    pub(super) fn known_key(&self, key: FieldKey) -> FormResult<FieldKey> {
        if self.model.contains(key) {
            Ok(key)
        } else {
            Err(FormError::UnknownField(key.to_string()))
        }
    }
}

fn into_object(values: impl Serialize) -> FormResult<Map<String, Value>> {
    match serde_json::to_value(values).map_err(|error| FormError::Conversion(error.to_string()))? {
        Value::Object(object) => Ok(object),
        Value::Null => Err(FormError::NotAnObject("null")),
        Value::Bool(_) => Err(FormError::NotAnObject("a boolean")),
        Value::Number(_) => Err(FormError::NotAnObject("a number")),
        Value::String(_) => Err(FormError::NotAnObject("a string")),
        Value::Array(_) => Err(FormError::NotAnObject("an array")),
    }
}

fn strict_from_values<T: DeserializeOwned>(values: FormValues) -> FormResult<T> {
    let object = values
        .into_iter()
        .map(|(key, value)| (key.as_str().to_owned(), normalize_number(value)))
        .collect::<Map<String, Value>>();
    serde_json::from_value(Value::Object(object))
        .map_err(|error| FormError::Conversion(error.to_string()))
}

pub(super) fn transition_submit_state(
    state: &mut FormState,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
