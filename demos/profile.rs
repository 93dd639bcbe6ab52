//! Profile form walkthrough: the form is loaded after a simulated network
//! delay, edited through field bindings, then submitted.
//!
//! Run with `RUST_LOG=simple_form=debug` to see the engine's events.

use std::time::Duration;

use futures::executor::block_on;
use futures_timer::Delay;
use serde::Deserialize;
use serde_json::json;
use simple_form::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, FormSchema)]
struct Profile {
    #[form(min_length = 3)]
    name: String,
    #[form(email)]
    email: String,
    #[form(min_length = 8)]
    password: String,
    age: Option<f64>,
    #[form(min = 0, max = 100, integer)]
    range: f64,
    date: Option<String>,
    #[form(must_be_true)]
    agree: bool,
    #[form(one_of("1", "2", "3"))]
    vote: String,
    #[form(one_of("A"))]
    vote2: String,
    #[form(one_of(2))]
    vote3: f64,
    color: String,
}

fn render(form: &FormController<Profile>) -> FormResult<()> {
    let snapshot = form.snapshot()?;
    if !snapshot.initialized {
        println!("Loading...");
        return Ok(());
    }
    for field in form.model().keys() {
        let props = form.props(field)?;
        let error = form
            .error_for_display(field)?
            .map(|error| format!("  <- {error}"))
            .unwrap_or_default();
        println!("  {:<24} {}{}", props.id, props.value, error);
    }
    Ok(())
}

async fn run() -> FormResult<()> {
    let fields = Profile::fields();
    let model = Profile::model_builder()
        .async_validator(fields.date(), future_date(Duration::from_millis(300)))
        .build()?;
    let options: FormOptions = serde_json::from_value(json!({ "formId": "profile" }))
        .map_err(|error| FormError::Conversion(error.to_string()))?;
    let form = FormController::<Profile>::new(model, options);

    render(&form)?;
    Delay::new(Duration::from_millis(500)).await;
    form.set_strict(
        json!({ "name": "XY", "email": "email@example.com", "zizi": "zizi" }),
        SetOptions {
            unknown_fields: UnknownFields::Discard,
        },
    )?;
    render(&form)?;

    println!("\nSubmitting the loaded values:");
    let submitted = form.submit(|_| async { Ok(()) }).await?;
    println!("submitted: {submitted}");
    render(&form)?;

    for (field, value) in [
        (fields.name().key(), json!("Jonathan")),
        (fields.password().key(), json!("correct-horse")),
        (fields.range().key(), json!(42)),
        (fields.date().key(), json!("2999-12-31")),
        (fields.agree().key(), json!(true)),
        (fields.vote().key(), json!("2")),
        (fields.vote2().key(), json!("A")),
        (fields.vote3().key(), json!(2)),
        (fields.color().key(), json!("#336699")),
    ] {
        form.props(field)?.change(value);
    }

    println!("\nSubmitting after edits:");
    form.submit(|profile: Profile| async move {
        println!("Form submit\n---------------------\n{profile:#?}");
        Ok(())
    })
    .await?;

    form.reset()?;
    println!("\nAfter reset:");
    render(&form)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(error) = block_on(run()) {
        eprintln!("profile demo failed: {error}");
        std::process::exit(1);
    }
}
