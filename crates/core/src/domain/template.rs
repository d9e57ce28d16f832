// Config Template Rendering
//
// Plugin configuration values may reference tenant configuration
// (`{{.proj.KEY}}`) and secrets (`{{.secret.KEY}}`). Rendering happens
// right before a plugin call; anything that does not resolve is left
// verbatim so the plugin (or a human reading its logs) can see what
// was asked for.

use std::collections::BTreeMap;

use crate::domain::project::{NamespaceSpec, ProjectSpec, Secret};
use crate::error::Result;

/// Scope prefix for merged project/namespace config.
pub const PROJECT_SCOPE: &str = "proj";

/// Scope prefix for decoded project secrets.
pub const SECRET_SCOPE: &str = "secret";

/// Lookup tables for one tenant, ready for rendering.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    project: BTreeMap<String, String>,
    secrets: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Builds the context for one (project, namespace) pair. Namespace
    /// config wins over project config; secrets are filtered down to
    /// those visible in the namespace and decoded.
    pub fn for_tenant(
        project: &ProjectSpec,
        namespace: &NamespaceSpec,
        secrets: &[Secret],
    ) -> Result<Self> {
        let mut decoded = BTreeMap::new();
        for secret in secrets {
            if secret.visible_in(&namespace.name) {
                decoded.insert(secret.name.clone(), secret.decoded_value()?);
            }
        }
        Ok(Self { project: namespace.merged_config(project), secrets: decoded })
    }

    /// Renders one value. Unresolved or malformed references stay
    /// verbatim in the output.
    pub fn render(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                None => {
                    // Unterminated reference, keep the tail as-is.
                    out.push_str(&rest[start..]);
                    return out;
                }
                Some(end) => {
                    match self.lookup(after[..end].trim()) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 2]),
                    }
                    rest = &after[end + 2..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Renders every value of a config map, keys untouched.
    pub fn render_map(&self, config: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        config.iter().map(|(key, value)| (key.clone(), self.render(value))).collect()
    }

    fn lookup(&self, expr: &str) -> Option<&str> {
        let expr = expr.strip_prefix('.')?;
        let (scope, key) = expr.split_once('.')?;
        match scope {
            PROJECT_SCOPE => self.project.get(key).map(String::as_str),
            SECRET_SCOPE => self.secrets.get(key).map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn context() -> TemplateContext {
        let project = ProjectSpec::new(
            Uuid::new_v4(),
            "sales",
            [("dataset".to_string(), "mart".to_string()), ("env".to_string(), "prod".to_string())]
                .into_iter()
                .collect(),
        );
        let namespace = NamespaceSpec::new(
            Uuid::new_v4(),
            "sales",
            "core",
            [("env".to_string(), "staging".to_string())].into_iter().collect(),
        );
        let secrets = vec![
            Secret::from_plaintext("warehouse_key", "k3y", None),
            Secret::from_plaintext("other_team_key", "nope", Some("growth".to_string())),
        ];
        TemplateContext::for_tenant(&project, &namespace, &secrets).unwrap()
    }

    #[test]
    fn test_render_project_and_secret_scopes() {
        let ctx = context();
        assert_eq!(ctx.render("load into {{.proj.dataset}}"), "load into mart");
        assert_eq!(ctx.render("token={{.secret.warehouse_key}}"), "token=k3y");
    }

    #[test]
    fn test_namespace_config_wins() {
        let ctx = context();
        assert_eq!(ctx.render("{{.proj.env}}"), "staging");
    }

    #[test]
    fn test_unresolved_left_verbatim() {
        let ctx = context();
        assert_eq!(ctx.render("{{.proj.missing}}"), "{{.proj.missing}}");
        assert_eq!(ctx.render("{{.unknown.key}}"), "{{.unknown.key}}");
        assert_eq!(ctx.render("{{plain}}"), "{{plain}}");
        // Secret scoped to another namespace is invisible here.
        assert_eq!(ctx.render("{{.secret.other_team_key}}"), "{{.secret.other_team_key}}");
    }

    #[test]
    fn test_whitespace_and_adjacent_references() {
        let ctx = context();
        assert_eq!(ctx.render("{{ .proj.dataset }}"), "mart");
        assert_eq!(ctx.render("{{.proj.dataset}}/{{.proj.env}}"), "mart/staging");
    }

    #[test]
    fn test_unterminated_reference_kept() {
        let ctx = context();
        assert_eq!(ctx.render("prefix {{.proj.dataset"), "prefix {{.proj.dataset");
    }

    #[test]
    fn test_render_map_keeps_keys() {
        let ctx = context();
        let config: BTreeMap<String, String> =
            [("sql".to_string(), "select * from {{.proj.dataset}}.t".to_string())]
                .into_iter()
                .collect();
        let rendered = ctx.render_map(&config);
        assert_eq!(rendered.get("sql").map(String::as_str), Some("select * from mart.t"));
    }
}
