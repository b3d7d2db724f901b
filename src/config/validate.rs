// src/config/validate.rs

use std::collections::BTreeSet;

use globset::Glob;

use crate::config::model::{RawRequestFile, RequestFile};
use crate::errors::{DriverError, Result};

impl TryFrom<RawRequestFile> for RequestFile {
    type Error = DriverError;

    fn try_from(raw: RawRequestFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_request(&raw)?;
        Ok(RequestFile::new_unchecked(raw.build, raw.inputs, raw.tools))
    }
}

fn validate_raw_request(raw: &RawRequestFile) -> Result<()> {
    validate_module_name(&raw.build.module_name)?;
    validate_build_section(raw)?;
    validate_inputs(raw)?;
    validate_tools(raw)?;
    Ok(())
}

fn validate_module_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DriverError::ConfigError(
            "[build].module_name must not be empty".to_string(),
        ));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(DriverError::ConfigError(format!(
            "[build].module_name '{name}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

fn validate_build_section(raw: &RawRequestFile) -> Result<()> {
    let build = &raw.build;

    if build.outputs.is_empty() {
        return Err(DriverError::ConfigError(
            "[build].outputs must name at least one output".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for output in &build.outputs {
        if !seen.insert(output) {
            return Err(DriverError::ConfigError(format!(
                "[build].outputs lists '{output}' more than once"
            )));
        }
    }

    if build.jobs == Some(0) {
        return Err(DriverError::ConfigError(
            "[build].jobs must be >= 1 (got 0)".to_string(),
        ));
    }

    if build.output_dir.trim().is_empty() {
        return Err(DriverError::ConfigError(
            "[build].output_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_inputs(raw: &RawRequestFile) -> Result<()> {
    let inputs = &raw.inputs;
    if inputs.files.is_empty() && inputs.include.is_empty() {
        return Err(DriverError::ConfigError(
            "[inputs] must list `files` or `include` patterns".to_string(),
        ));
    }

    for pattern in inputs.include.iter().chain(&inputs.exclude) {
        Glob::new(pattern).map_err(|err| {
            DriverError::ConfigError(format!("invalid glob pattern '{pattern}' in [inputs]: {err}"))
        })?;
    }
    Ok(())
}

fn validate_tools(raw: &RawRequestFile) -> Result<()> {
    let tools = &raw.tools;
    if tools.compiler.trim().is_empty() {
        return Err(DriverError::ConfigError(
            "[tools].compiler must not be empty".to_string(),
        ));
    }
    if raw.build.explicit_modules && tools.scanner.is_none() {
        return Err(DriverError::ConfigError(
            "[build].explicit_modules requires [tools].scanner".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawRequestFile {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn accepts_minimal_request() {
        let cfg = RequestFile::try_from(raw(
            r#"
            [build]
            module_name = "App"

            [inputs]
            files = ["main.src"]
            "#,
        ))
        .unwrap();
        assert_eq!(cfg.build().module_name, "App");
        assert_eq!(cfg.tools().compiler, "cc");
        assert_eq!(cfg.build().output_dir, "build");
    }

    #[test]
    fn rejects_bad_module_name_and_zero_jobs() {
        let err = RequestFile::try_from(raw(
            r#"
            [build]
            module_name = "my app"
            [inputs]
            files = ["a.src"]
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("module_name"));

        let err = RequestFile::try_from(raw(
            r#"
            [build]
            module_name = "App"
            jobs = 0
            [inputs]
            files = ["a.src"]
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("jobs"));
    }

    #[test]
    fn rejects_missing_inputs_and_bad_globs() {
        let err = RequestFile::try_from(raw(
            r#"
            [build]
            module_name = "App"
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, DriverError::ConfigError(_)));

        let err = RequestFile::try_from(raw(
            r#"
            [build]
            module_name = "App"
            [inputs]
            include = ["src/[*.src"]
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("invalid glob"));
    }

    #[test]
    fn explicit_modules_need_a_scanner() {
        let err = RequestFile::try_from(raw(
            r#"
            [build]
            module_name = "App"
            explicit_modules = true
            [inputs]
            files = ["a.src"]
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("scanner"));
    }
}
