//! Resolution of raw per-group kernel parameters into concrete initializers.

use std::collections::HashMap;

use px_types::{
    DistributionKind, Initializer, KernelParams, ModelConfiguration, ModelError, ParameterGroup,
};

/// Default numeric backend when a group names none.
pub const PRIMARY_BACKEND: &str = "ndarray";
/// Alternate registered backend.
pub const ALTERNATE_BACKEND: &str = "burn";

/// Resolves a group's raw `kernel_params` against a per-backend table of
/// default distribution parameters, producing ready-to-use initializers.
///
/// Resolution order: the chosen backend's default for the chosen
/// distribution (normal when unspecified), then any fields supplied in
/// `kernel_params` override the defaults. Naming an unregistered backend is
/// an error. The result is cached on the group, so this runs once per group
/// per configuration build, never per layer.
#[derive(Debug, Clone)]
pub struct InitializerResolver {
    defaults: HashMap<String, HashMap<DistributionKind, Initializer>>,
}

impl InitializerResolver {
    pub fn new() -> Self {
        let mut defaults = HashMap::new();
        for backend in [PRIMARY_BACKEND, ALTERNATE_BACKEND] {
            let mut by_kind = HashMap::new();
            by_kind.insert(
                DistributionKind::Normal,
                Initializer::Normal {
                    mean: 0.0,
                    stddev: 1.0,
                },
            );
            by_kind.insert(
                DistributionKind::Uniform,
                Initializer::Uniform {
                    minval: 0.0,
                    maxval: 0.0,
                },
            );
            defaults.insert(backend.to_string(), by_kind);
        }
        Self { defaults }
    }

    pub fn registered_backends(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Resolve one raw kernel request into a concrete initializer.
    pub fn resolve_kernel(&self, kernel: &KernelParams) -> Result<Initializer, ModelError> {
        let backend = kernel.backend.as_deref().unwrap_or(PRIMARY_BACKEND);
        let by_kind = self
            .defaults
            .get(backend)
            .ok_or_else(|| ModelError::UnknownBackend {
                backend: backend.to_string(),
            })?;
        let kind = kernel.distrib.unwrap_or(DistributionKind::Normal);
        // The table covers both kinds for every registered backend.
        let base = by_kind[&kind];

        let resolved = match base {
            Initializer::Normal { mean, stddev } => Initializer::Normal {
                mean: kernel.mean.unwrap_or(mean),
                stddev: kernel.stddev.unwrap_or(stddev),
            },
            Initializer::Uniform { minval, maxval } => Initializer::Uniform {
                minval: kernel.minval.unwrap_or(minval),
                maxval: kernel.maxval.unwrap_or(maxval),
            },
        };
        Ok(resolved)
    }

    /// Resolve and cache the kernel (and, when bias is enabled, bias)
    /// initializer on one group.
    pub fn resolve_group(&self, group: &mut ParameterGroup) -> Result<(), ModelError> {
        group.kernel_init = Some(self.resolve_kernel(&group.kernel_params)?);
        group.bias_init = group.use_bias.then_some(group.bias_value);
        Ok(())
    }

    /// Resolve every parameter group of a configuration in place.
    pub fn resolve_configuration(
        &self,
        config: &mut ModelConfiguration,
    ) -> Result<(), ModelError> {
        for (_, group) in config.groups_mut() {
            self.resolve_group(group)?;
        }
        Ok(())
    }
}

impl Default for InitializerResolver {
    fn default() -> Self {
        Self::new()
    }
}
