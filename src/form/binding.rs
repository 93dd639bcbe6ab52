use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::controller::{FormController, FormResult, read_lock};
use super::schema::FieldKey;
use super::validation::ValidationError;

pub type ChangeHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Everything an input needs to render one field and report edits back.
#[derive(Clone)]
pub struct FieldProps {
    pub id: String,
    pub name: FieldKey,
    pub value: Value,
    pub on_change: ChangeHandler,
}

impl FieldProps {
    pub fn change(&self, value: impl Into<Value>) {
        (self.on_change)(value.into())
    }
}

impl Debug for FieldProps {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldProps")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl<T> FormController<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn props(&self, field: impl Into<FieldKey>) -> FormResult<FieldProps> {
        let key = self.known_key(field.into())?;
        let value = read_lock(&self.state, "reading value for binding")?
            .values
            .get(&key)
            .cloned()
            .unwrap_or(Value::Null);
        let controller = self.clone();
        Ok(FieldProps {
            id: format!("{}-{}", self.form_id, key),
            name: key,
            value,
            on_change: Arc::new(move |next: Value| {
                if let Err(error) = controller.change(key, next) {
                    tracing::warn!(field = %key, %error, "dropping field change");
                }
            }),
        })
    }

    /// The field's rejection reason once the user has touched the field or
    /// tried to submit.
    pub fn error_for_display(
        &self,
        field: impl Into<FieldKey>,
    ) -> FormResult<Option<ValidationError>> {
        let key = self.known_key(field.into())?;
        let state = read_lock(&self.state, "reading display error message")?;
        let Some(meta) = state.field_meta.get(&key) else {
            return Ok(None);
        };
        if !meta.touched && state.submit_count == 0 {
            return Ok(None);
        }
        Ok(meta.status.error().cloned())
    }
}
