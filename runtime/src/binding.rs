//! Route-value parameter binding.

use actionflow_core::descriptor::ParameterKind;
use actionflow_core::{ActionDescriptor, ActionError, ParameterBinder, Parameters, RequestContext};

/// Default [`ParameterBinder`].
///
/// Each declared value parameter is looked up by name in the request's route
/// values, then its query values, then falls back to the declared default.
/// Cancellation parameters are left to the executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteValueBinder;

impl ParameterBinder for RouteValueBinder {
    fn bind_parameters(
        &self,
        request: &RequestContext,
        action: &ActionDescriptor,
    ) -> Result<Parameters, ActionError> {
        let mut parameters = Parameters::new();
        for parameter in action.parameters() {
            if parameter.kind == ParameterKind::Cancellation {
                continue;
            }

            let value = request
                .value(&parameter.name)
                .cloned()
                .or_else(|| parameter.default.clone());

            match value {
                Some(value) => {
                    parameters.insert(parameter.name.clone(), value);
                }
                None if parameter.required => {
                    return Err(ActionError::Binding {
                        action: action.name().to_string(),
                        parameter: parameter.name.clone(),
                        reason: "not present in route values or query".to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(parameters)
    }
}
