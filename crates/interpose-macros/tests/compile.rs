//! Expansion compiles in crates that only reach the runtime through a re-export

#[test]
fn reexported_runtime_compiles() {
    let cases = trybuild::TestCases::new();
    cases.pass("tests/trybuild/*_valid.rs");
}
