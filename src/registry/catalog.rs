//! Function catalog construction
//!
//! Turns a server's listing into descriptors, merging in config metadata.
//! Config wins over what the server reports. Read and search functions must end
//! up with an explicit cacheability; a function we cannot classify is left out.

use super::types::{FunctionDescriptor, RemoteFunction, ServerDescriptor};
use tracing::{debug, warn};

/// Build the descriptors for one server from its listing
pub fn build_catalog(server: &ServerDescriptor, listing: Vec<RemoteFunction>) -> Vec<FunctionDescriptor> {
    let mut descriptors = Vec::with_capacity(listing.len());

    for remote in listing {
        let overrides = server.function_overrides.get(&remote.name);

        let class = overrides.and_then(|o| o.class).or(remote.function_class);
        let Some(class) = class else {
            warn!(
                "⚠️ [CATALOG] Excluding '{}' from server '{}': no function class",
                remote.name, server.name
            );
            continue;
        };

        let cacheable = overrides.and_then(|o| o.cacheable).or(remote.cacheable);
        let cacheable = match cacheable {
            Some(value) => value,
            // side-effecting classes can only ever be non-cacheable
            None if !class.allows_caching() => false,
            None => {
                warn!(
                    "⚠️ [CATALOG] Excluding '{}' from server '{}': cacheability not declared",
                    remote.name, server.name
                );
                continue;
            }
        };

        let description = overrides
            .and_then(|o| o.description.clone())
            .or(remote.description);
        let schema = overrides
            .and_then(|o| o.parameters.clone())
            .unwrap_or(remote.input_schema);
        let query_parameter = overrides
            .and_then(|o| o.query_parameter.clone())
            .or(remote.query_parameter);

        match FunctionDescriptor::new(
            &server.name,
            &remote.name,
            description,
            schema,
            class,
            cacheable,
            query_parameter,
        ) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => {
                warn!(
                    "⚠️ [CATALOG] Excluding '{}' from server '{}': {}",
                    remote.name, server.name, e
                );
            }
        }
    }

    for name in server.function_overrides.keys() {
        if !descriptors.iter().any(|d| &d.name == name) {
            debug!(
                "[CATALOG] Server '{}' did not list configured function '{}'",
                server.name, name
            );
        }
    }

    descriptors
}
