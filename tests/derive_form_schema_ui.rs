#[test]
fn form_schema_derive_ui() {
    let testcases = trybuild::TestCases::new();
    testcases.pass("tests/ui/form_schema/pass.rs");
    testcases.compile_fail("tests/ui/form_schema/fail_generic.rs");
    testcases.compile_fail("tests/ui/form_schema/fail_unknown_option.rs");
}
