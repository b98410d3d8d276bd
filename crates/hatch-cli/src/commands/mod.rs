//! CLI command definitions and dispatch.

pub mod pull;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hatch_common::config::{HatchConfig, IsolationStrategy, LinkPolicy};
use hatch_common::constants;

/// Hatch: run a command inside a pulled container image.
#[derive(Parser, Debug)]
#[command(name = constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory under which image rootfs trees are assembled.
    #[arg(long, global = true, env = "HATCH_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Registry base URL serving the `/v2/` API.
    #[arg(long, global = true, env = "HATCH_REGISTRY_URL", default_value = constants::DEFAULT_REGISTRY_URL)]
    pub registry_url: String,

    /// Token endpoint for anonymous pulls.
    #[arg(long, global = true, env = "HATCH_AUTH_URL", default_value = constants::DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// `service` parameter sent to the token endpoint.
    #[arg(long, global = true, env = "HATCH_AUTH_SERVICE", default_value = constants::DEFAULT_AUTH_SERVICE)]
    pub auth_service: String,

    /// Repository namespace prepended to image names (empty for none).
    #[arg(long, global = true, env = "HATCH_NAMESPACE", default_value = constants::DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Skip SHA-256 verification of downloaded layers.
    #[arg(long, global = true, env = "HATCH_NO_VERIFY")]
    pub no_verify: bool,

    /// Treatment of symlinks and hard links in layers: `skip` or `materialize`.
    #[arg(long, global = true, env = "HATCH_LINKS", default_value = "materialize")]
    pub links: LinkPolicy,

    /// Isolation strategy: `spawned-child` or `in-process`.
    #[arg(long, global = true, env = "HATCH_ISOLATION", default_value = "spawned-child")]
    pub isolation: IsolationStrategy,

    /// Absolute host path of a binary to stage into the rootfs (repeatable).
    #[arg(long = "helper", global = true, env = "HATCH_HELPERS", value_delimiter = ',')]
    pub helpers: Vec<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull an image and run a command inside it.
    Run(run::RunArgs),
    /// Pull an image into a rootfs and print its path.
    Pull(pull::PullArgs),
}

impl Cli {
    /// Builds the pipeline configuration from the global flags.
    #[must_use]
    pub fn config(&self) -> HatchConfig {
        let mut config = HatchConfig {
            verify_digests: !self.no_verify,
            link_policy: self.links,
            isolation: self.isolation,
            helper_binaries: self.helpers.clone(),
            ..HatchConfig::default()
        };
        if let Some(base_dir) = &self.base_dir {
            config.base_dir.clone_from(base_dir);
        }
        config.registry.registry_url.clone_from(&self.registry_url);
        config.registry.auth_url.clone_from(&self.auth_url);
        config.registry.auth_service.clone_from(&self.auth_service);
        config.registry.namespace.clone_from(&self.namespace);
        config
    }
}

/// Dispatches the parsed CLI command and returns the process exit code.
///
/// # Errors
///
/// Returns an error if the pull or launch pipeline fails.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.config();
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Pull(args) => pull::execute(&args, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn run_collects_trailing_arguments() {
        let cli = parse(&["hatch", "run", "alpine", "/bin/sh", "-c", "echo hi"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.image, "alpine");
        assert_eq!(args.command, "/bin/sh");
        assert_eq!(args.args, ["-c", "echo hi"]);
    }

    #[test]
    fn cli_defaults_materialize_links() {
        let config = parse(&["hatch", "pull", "alpine"]).config();
        assert_eq!(config.link_policy, LinkPolicy::Materialize);
        assert_eq!(config.isolation, IsolationStrategy::SpawnedChild);
        assert!(config.verify_digests);
    }

    #[test]
    fn global_flags_reach_config() {
        let config = parse(&[
            "hatch",
            "pull",
            "--base-dir",
            "/tmp/hatch-rootfs",
            "--registry-url",
            "http://127.0.0.1:5000",
            "--namespace",
            "",
            "--no-verify",
            "--links",
            "skip",
            "--isolation",
            "in-process",
            "--helper",
            "/usr/bin/env,/bin/true",
            "busybox:1.36",
        ])
        .config();

        assert_eq!(config.base_dir, PathBuf::from("/tmp/hatch-rootfs"));
        assert_eq!(config.registry.registry_url, "http://127.0.0.1:5000");
        assert_eq!(config.registry.repository("busybox"), "busybox");
        assert!(!config.verify_digests);
        assert_eq!(config.link_policy, LinkPolicy::Skip);
        assert_eq!(config.isolation, IsolationStrategy::InProcess);
        assert_eq!(
            config.helper_binaries,
            [PathBuf::from("/usr/bin/env"), PathBuf::from("/bin/true")]
        );
    }

    #[test]
    fn unknown_link_policy_is_rejected() {
        assert!(Cli::try_parse_from(["hatch", "--links", "copy", "pull", "alpine"]).is_err());
    }
}
