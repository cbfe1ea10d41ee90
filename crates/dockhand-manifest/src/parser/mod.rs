//! Manifest parser built on `serde_yaml`.
//!
//! Transforms raw manifest text (YAML, or JSON as a YAML subset) into a
//! raw AST, which the validator then compiles into a [`Catalog`].
//!
//! [`Catalog`]: crate::model::Catalog

pub mod ast;
pub mod validator;

use dockhand_common::error::{DockhandError, Result};

use self::ast::ManifestFile;

/// Parses manifest text into its raw declarations.
///
/// An empty document is an empty manifest.
///
/// # Errors
///
/// Returns a validation error if the text is not well-formed or a
/// declaration has fields of the wrong shape.
pub fn parse_manifest(input: &str) -> Result<ManifestFile> {
    if input.trim().is_empty() {
        return Ok(ManifestFile::default());
    }
    let file: ManifestFile = serde_yaml::from_str(input).map_err(|e| {
        let resource = e.location().map_or_else(
            || "manifest".to_string(),
            |loc| format!("manifest line {}", loc.line()),
        );
        DockhandError::validation(resource, e.to_string())
    })?;
    tracing::debug!(resources = file.resources.len(), "manifest parsed");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::ast::{CommandLine, Declaration, Ensure};
    use super::*;

    #[test]
    fn parse_empty_input() {
        let file = parse_manifest("").expect("should parse");
        assert!(file.resources.is_empty());
    }

    #[test]
    fn parse_image_and_run() {
        let input = r#"
resources:
  - kind: image
    id: alpine
    tag: "3.7"
  - kind: run
    id: c1
    image: alpine
    command: init
    ports: [4444]
    expose: "5555"
    require: "Image[alpine]"
"#;
        let file = parse_manifest(input).expect("should parse");
        assert_eq!(file.resources.len(), 2);

        let Declaration::Image(image) = &file.resources[0] else {
            panic!("expected image");
        };
        assert_eq!(image.tag.as_deref(), Some("3.7"));

        let Declaration::Run(run) = &file.resources[1] else {
            panic!("expected run");
        };
        assert_eq!(run.command, Some(CommandLine::Line("init".into())));
        assert_eq!(run.ports.0, vec!["4444"]);
        assert_eq!(run.expose.0, vec!["5555"]);
        assert_eq!(run.depends_on.0, vec!["Image[alpine]"]);
    }

    #[test]
    fn parse_exec_flags() {
        let input = r"
resources:
  - kind: exec
    id: seed
    container: c1
    command: [touch, /root/file]
    tty: true
    refreshonly: true
    subscribe: Run[c1]
";
        let file = parse_manifest(input).expect("should parse");
        let Declaration::Exec(exec) = &file.resources[0] else {
            panic!("expected exec");
        };
        assert!(exec.tty);
        assert!(exec.refreshonly);
        assert!(!exec.detach);
        assert_eq!(
            exec.command,
            Some(CommandLine::Argv(vec!["touch".into(), "/root/file".into()]))
        );
        assert_eq!(exec.subscribes.0, vec!["Run[c1]"]);
    }

    #[test]
    fn parse_accepts_json() {
        let input = r#"{"resources": [{"kind": "run", "id": "c1", "image": "alpine", "ensure": "stopped"}]}"#;
        let file = parse_manifest(input).expect("should parse");
        let Declaration::Run(run) = &file.resources[0] else {
            panic!("expected run");
        };
        assert_eq!(run.ensure, Some(Ensure::Stopped));
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let input = "resources:\n  - kind: volume\n    id: data\n";
        assert!(parse_manifest(input).is_err());
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let input = "resources:\n  - kind: exec\n    id: x\n    refreshonyl: true\n";
        let err = parse_manifest(input).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parse_rejects_bad_ensure() {
        let input = "resources:\n  - kind: image\n    id: alpine\n    ensure: maybe\n";
        assert!(parse_manifest(input).is_err());
    }
}
