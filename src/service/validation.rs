//! Request body validation from property metadata and configured constraints.

use crate::config::ConstraintsConfig;
use crate::error::AppError;
use crate::metadata::{PropertyMetadataFactory, PropertyNameCollectionFactory, PropertyOptions, ResourceCatalog};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct RequestValidator {
    catalog: Arc<ResourceCatalog>,
    names: Arc<dyn PropertyNameCollectionFactory>,
    properties: Arc<dyn PropertyMetadataFactory>,
}

impl RequestValidator {
    pub fn new(
        catalog: Arc<ResourceCatalog>,
        names: Arc<dyn PropertyNameCollectionFactory>,
        properties: Arc<dyn PropertyMetadataFactory>,
    ) -> Self {
        RequestValidator {
            catalog,
            names,
            properties,
        }
    }

    /// Validate `body` for `resource_class`. With `partial`, required properties may be absent (PUT/PATCH).
    /// Non-writable properties other than identifiers are rejected.
    pub fn validate(
        &self,
        resource_class: &str,
        body: &Map<String, Value>,
        partial: bool,
        options: &PropertyOptions,
    ) -> Result<(), AppError> {
        for name in &self.names.create(resource_class)? {
            let metadata = match self.properties.create(resource_class, name, options) {
                Ok(m) => m,
                Err(e) if e.is_metadata_not_found() => continue,
                Err(e) => return Err(e),
            };
            let val = body.get(name);
            if let Some(v) = val {
                if metadata.is_writable() == Some(false) && metadata.is_identifier() != Some(true) && !v.is_null() {
                    return Err(AppError::Validation(format!("{} is not writable", name)));
                }
            }
            if !partial && metadata.is_required() == Some(true) && (val.is_none() || val == Some(&Value::Null)) {
                return Err(AppError::Validation(format!("{} is required", name)));
            }
            let constraints = self
                .catalog
                .property(resource_class, name)
                .and_then(|p| p.constraints.as_ref());
            if let (Some(v), Some(rule)) = (val, constraints) {
                validate_field(name, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ConstraintsConfig) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let (Some(max), Some(s)) = (rule.max_length, v.as_str()) {
        if s.chars().count() > max as usize {
            return Err(AppError::Validation(format!("{} must be at most {} characters", col, max)));
        }
    }
    if let (Some(min), Some(s)) = (rule.min_length, v.as_str()) {
        if s.chars().count() < min as usize {
            return Err(AppError::Validation(format!("{} must be at least {} characters", col, min)));
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let (Some(min), Some(n)) = (rule.minimum, v.as_f64()) {
        if n < min {
            return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
        }
    }
    if let (Some(max), Some(n)) = (rule.maximum, v.as_f64()) {
        if n > max {
            return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => {
            Err(AppError::Validation(format!("{} must be a valid email", col)))
        }
        "uuid" if uuid::Uuid::parse_str(s).is_err() => {
            Err(AppError::Validation(format!("{} must be a valid UUID", col)))
        }
        "date-time" if chrono::DateTime::parse_from_rfc3339(s).is_err() => {
            Err(AppError::Validation(format!("{} must be an RFC 3339 date-time", col)))
        }
        _ => Ok(()),
    }
}
