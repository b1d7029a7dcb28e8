//! VM metadata templating
//!
//! Metadata values may reference the VM and its network settings through
//! Jinja2 expressions, e.g. `{{ v1alpha1.vm.name }}` or
//! `{{ v1alpha1.net.devices[0].ip_addresses[0] }}`.
//!
//! Comments use `{## ... ##}` so shell parameter expansions such as
//! `${#arr[@]}` in user-data pass through as text.
//!
//! Rendering is fail-soft: a value that fails to parse or render is kept
//! as written. Authors write literal braces as `\{` and `\}`; those are
//! always unescaped, whether or not rendering ran or succeeded.

pub mod context;

pub use context::build_context;

use crate::vm::{VirtualMachineContext, VmUpdateArgs};
use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use tracing::{debug, error, warn};

/// Replace `\{` and `\}` with literal braces
pub fn normalize_escapes(value: &str) -> String {
    if value.contains("\\{") || value.contains("\\}") {
        value.replace("\\{", "{").replace("\\}", "}")
    } else {
        value.to_string()
    }
}

/// Render `source` against `context`.
///
/// On a parse or render error the error is logged and the escape
/// normalized `source` is returned.
pub fn render_or_original(name: &str, source: &str, context: &minijinja::Value) -> String {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    // Template names are metadata keys; never derive HTML escaping from them
    env.set_auto_escape_callback(|_| AutoEscape::None);
    match metadata_syntax() {
        Ok(syntax) => env.set_syntax(syntax),
        Err(e) => error!("Invalid template syntax config: {}", e),
    }

    if let Err(e) = env.add_template(name, source) {
        warn!(key = name, template = source, "Failed to parse template: {}", e);
        return normalize_escapes(source);
    }

    let rendered = env
        .get_template(name)
        .and_then(|tmpl| tmpl.render(context));

    match rendered {
        Ok(output) => normalize_escapes(&output),
        Err(e) => {
            error!(key = name, template = source, "Failed to execute template: {}", e);
            normalize_escapes(source)
        }
    }
}

fn metadata_syntax() -> Result<SyntaxConfig, minijinja::Error> {
    SyntaxConfig::builder()
        .comment_delimiters("{##", "##}")
        .build()
}

/// Render every metadata value of `update_args` in place.
///
/// Each value is rendered against the same context, built once from the
/// VM and the pass's network settings, so no value can observe another.
pub fn template_vm_metadata(vm_ctx: &VirtualMachineContext, update_args: &mut VmUpdateArgs) {
    let context = build_context(
        &vm_ctx.vm,
        &update_args.net_if_list,
        &update_args.dns_servers,
    );

    debug!(
        "Templating {} metadata values",
        update_args.vm_metadata.data.len()
    );
    for (key, value) in update_args.vm_metadata.data.iter_mut() {
        *value = render_or_original(key, value, &context);
    }
}

/// Unescape every metadata value of `update_args` in place without
/// rendering
pub fn normalize_vm_metadata(update_args: &mut VmUpdateArgs) {
    for value in update_args.vm_metadata.data.values_mut() {
        *value = normalize_escapes(value);
    }
}
