use crate::error::SqlFluentError;
use crate::types::{ParameterDirection, SqlType, SqlValue};

/// Name of the parameter bound to a procedure's return code.
pub const RETURN_VALUE_NAME: &str = "__returnValue";

/// Parameter name without its leading `@`.
#[must_use]
pub fn bare_name(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

/// One named command parameter: direction, optional declared type and
/// size, and the bound (or, after execution, final) value.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    name: String,
    direction: ParameterDirection,
    sql_type: Option<SqlType>,
    size: Option<i32>,
    value: SqlValue,
}

impl SqlParameter {
    /// Input parameter; the type is inferred from `value`.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            direction: ParameterDirection::Input,
            sql_type: None,
            size: None,
            value: value.into(),
        }
    }

    /// Output-only parameter of the given type, initially NULL.
    pub fn output(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self::new(name, SqlValue::Null)
            .with_direction(ParameterDirection::Output)
            .with_type(sql_type)
    }

    #[must_use]
    pub fn with_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: i32) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    /// Declared type, falling back to the type inferred from the value.
    #[must_use]
    pub fn sql_type(&self) -> Option<SqlType> {
        self.sql_type.or_else(|| SqlType::infer(&self.value))
    }

    #[must_use]
    pub fn size(&self) -> Option<i32> {
        self.size
    }

    #[must_use]
    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: SqlValue) {
        self.value = value;
    }

    /// Whether `name` refers to this parameter, with or without `@`.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        bare_name(&self.name).eq_ignore_ascii_case(bare_name(name))
    }
}

/// Ordered parameters of one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCollection {
    items: Vec<SqlParameter>,
}

impl ParameterCollection {
    pub fn push(&mut self, parameter: SqlParameter) {
        self.items.push(parameter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[SqlParameter] {
        &self.items
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SqlParameter> {
        self.items.iter().find(|p| p.matches(name))
    }

    /// Store the final values reported by the driver.
    pub(crate) fn apply_outputs(&mut self, outputs: Vec<(String, SqlValue)>) {
        for (name, value) in outputs {
            if let Some(param) = self.items.iter_mut().find(|p| p.matches(&name)) {
                param.set_value(value);
            }
        }
    }
}

/// Reject a parameter list that names the same parameter twice.
///
/// # Errors
///
/// Returns `SqlFluentError::ExecutionError` naming the first duplicate.
pub fn ensure_unique_names(parameters: &[SqlParameter]) -> Result<(), SqlFluentError> {
    for (i, param) in parameters.iter().enumerate() {
        if parameters[..i].iter().any(|earlier| earlier.matches(param.name())) {
            return Err(SqlFluentError::ExecutionError(format!(
                "The variable name '@{}' has already been declared. Variable names must be unique within a query batch or stored procedure.",
                bare_name(param.name())
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_with_or_without_at_sign() {
        let param = SqlParameter::new("@Total", 1_i32);
        assert!(param.matches("total"));
        assert!(param.matches("@TOTAL"));
        assert!(!param.matches("totals"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let params = vec![
            SqlParameter::new("a", 1_i32),
            SqlParameter::new("@A", 2_i32),
        ];
        assert!(matches!(
            ensure_unique_names(&params),
            Err(SqlFluentError::ExecutionError(_))
        ));
        assert!(ensure_unique_names(&params[..1]).is_ok());
    }

    #[test]
    fn untyped_parameters_infer_from_value() {
        let param = SqlParameter::new("p", "text");
        assert_eq!(param.sql_type(), Some(SqlType::NVarChar));
        assert_eq!(SqlParameter::new("n", SqlValue::Null).sql_type(), None);
    }
}
