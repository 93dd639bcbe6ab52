use crate::form::FormSchema as _;
use serde::Deserialize;

#[allow(dead_code)]
#[derive(Clone, Debug, Deserialize, crate::form::FormSchema)]
struct Newsletter {
    #[form(email)]
    email: String,
    #[form(must_be_true)]
    consent: bool,
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn form_facade_exports_core_types() {
    let _ = crate::form::FormOptions::default();
    let _ = crate::form::SetOptions::default();
    let _ = crate::form::UnknownFields::Discard;
    let _ = crate::form::SubmitState::Idle;
    let _ = crate::form::FieldStatus::Unvalidated;
    let _ = crate::form::ValueKind::String;
    let _ = crate::form::FormModel::builder();
    let _ = crate::form::validators::future_date(std::time::Duration::ZERO);
    assert_send_sync::<crate::form::FormController<Newsletter>>();
    assert_send_sync::<crate::form::FieldProps>();
}

#[test]
fn prelude_smoke_builds_a_form() {
    use crate::prelude::*;

    let model = Newsletter::model().expect("derived model builds");
    let controller = FormController::<Newsletter>::new(model, FormOptions::default());
    let fields = Newsletter::fields();
    let props = controller.props(fields.email()).expect("email is a field");
    assert_eq!(props.name, FieldKey::new("email"));
    assert_eq!(props.value, Value::Null);
    let _ = fields.consent();
}
