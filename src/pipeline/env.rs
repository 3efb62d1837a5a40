//! Default launch environment for the invoker

use crate::config::schema::InvokerConfig;

/// Render the profile.d script exporting the invoker defaults
///
/// The slot index keeps `INVOKER_DIR` pointing at this buildpack's install
/// when several buildpacks share the deps dir.
pub fn default_env_script(invoker: &InvokerConfig, deps_idx: &str) -> String {
    format!(
        "export HOST={host}\n\
         export HTTP_PORT=${{HTTP_PORT:{http}}}\n\
         export GRPC_PORT=${{GRPC_PORT:{grpc}}}\n\
         export INVOKER_DIR=\"$DEPS_DIR/{idx}/{dir}\"\n",
        host = invoker.host,
        http = invoker.http_port,
        grpc = invoker.grpc_port,
        idx = deps_idx,
        dir = invoker.install_dir,
    )
}
