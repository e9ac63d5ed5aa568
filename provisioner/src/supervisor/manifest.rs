//! pm2 ecosystem manifest
//!
//! The manifest is JavaScript so that it can resolve its base directory and ports when pm2 loads
//! it rather than when it is generated: moving the deployment tree, or exporting `APP_BASE_DIR`
//! or a `*_PORT` variable, changes where and how the processes run without regenerating.

use std::path::Path;

use crate::config::settings::{Settings, BACKEND_PORT, FRONTEND_PORT};
use crate::deploy::artifacts::{ArtifactTarget, DeploymentTarget};
use crate::errors::ProvisionError;
use crate::filesys::file::File;

/// One argument of a start command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartArg {
    Literal(String),

    /// The process's listening port
    Port,
}

/// One supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub name: String,

    /// Working directory relative to the base directory
    pub subdir: String,

    pub script: String,
    pub args: Vec<StartArg>,

    /// Environment variable that overrides the port at load time
    pub port_var: String,
    pub port: u16,

    pub node_env: String,
}

/// Every process the deployment runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorManifest {
    pub processes: Vec<ProcessSpec>,
}

impl SupervisorManifest {
    /// Backend and frontend, started through their `start` scripts
    pub fn for_target(target: &DeploymentTarget, settings: &Settings) -> Self {
        let backend = process(
            &target.base_dir,
            &target.backend,
            BACKEND_PORT,
            vec![StartArg::Literal("run".into()), StartArg::Literal("start".into())],
            settings,
        );
        let frontend = process(
            &target.base_dir,
            &target.frontend,
            FRONTEND_PORT,
            vec![
                StartArg::Literal("run".into()),
                StartArg::Literal("start".into()),
                StartArg::Literal("--".into()),
                StartArg::Literal("-p".into()),
                StartArg::Port,
            ],
            settings,
        );
        Self {
            processes: vec![backend, frontend],
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Render as `ecosystem.config.js`
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("// Generated by provision on every run. Local edits are overwritten.\n");
        out.push_str("const path = require(\"path\");\n\n");
        out.push_str("const BASE_DIR = process.env.APP_BASE_DIR || __dirname;\n");
        for p in &self.processes {
            out.push_str(&format!(
                "const {var} = process.env.{var} || {port};\n",
                var = p.port_var,
                port = js_string(&p.port.to_string()),
            ));
        }
        out.push_str("\nmodule.exports = {\n  apps: [\n");
        for p in &self.processes {
            let args = p
                .args
                .iter()
                .map(|a| match a {
                    StartArg::Literal(s) => js_string(s),
                    StartArg::Port => p.port_var.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str("    {\n");
            out.push_str(&format!("      name: {},\n", js_string(&p.name)));
            out.push_str(&format!("      cwd: path.join(BASE_DIR, {}),\n", js_string(&p.subdir)));
            out.push_str(&format!("      script: {},\n", js_string(&p.script)));
            out.push_str(&format!("      args: [{}],\n", args));
            out.push_str("      autorestart: true,\n");
            out.push_str("      env: {\n");
            out.push_str(&format!("        NODE_ENV: {},\n", js_string(&p.node_env)));
            out.push_str(&format!("        PORT: {},\n", p.port_var));
            out.push_str("      },\n");
            out.push_str("    },\n");
        }
        out.push_str("  ],\n};\n");
        out
    }

    /// Replace the manifest file
    pub async fn write(&self, file: &File) -> Result<(), ProvisionError> {
        file.write_string(&self.render()).await
    }
}

fn process(
    base_dir: &Path,
    artifact: &ArtifactTarget,
    port_var: &str,
    args: Vec<StartArg>,
    settings: &Settings,
) -> ProcessSpec {
    let subdir = artifact
        .dir
        .strip_prefix(base_dir)
        .unwrap_or(&artifact.dir)
        .to_string_lossy()
        .into_owned();
    ProcessSpec {
        name: artifact.name.clone(),
        subdir,
        script: "npm".to_string(),
        args,
        port_var: port_var.to_string(),
        port: artifact.port,
        node_env: settings.environment.clone(),
    }
}

fn js_string(value: &str) -> String {
    // JSON string literals are valid JavaScript
    serde_json::Value::String(value.to_string()).to_string()
}
