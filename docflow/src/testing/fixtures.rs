//! Shared document fixtures.

/// A small resume document with the section anchors the default
/// registry's strategies target.
#[must_use]
pub fn sample_resume_document() -> String {
    concat!(
        "<body>",
        r#"<section class="summary"><p>Seasoned engineer.</p></section>"#,
        r#"<section class="experience"><p>Led the platform team.</p></section>"#,
        r#"<section class="skills"><ul><li>Rust</li></ul></section>"#,
        r#"<section class="education"><p>BSc Computer Science.</p></section>"#,
        "</body>",
    )
    .to_string()
}
