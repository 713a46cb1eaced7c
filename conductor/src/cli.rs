use clap::{Args, Parser, Subcommand};
use model::config::DEFAULT_CONFIG_FILE;
use model::Permission;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "Manage products, test runs, environments and results")]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Snapshot file, overriding the configured one
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,
    /// Username of the acting user
    #[arg(short, long, global = true)]
    pub user: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage users and their permissions
    #[command(subcommand)]
    User(UserCommand),
    /// Manage environments
    #[command(subcommand)]
    Env(EnvCommand),
    /// Manage products
    #[command(subcommand)]
    Product(ProductCommand),
    /// Manage product versions and the environments they allow
    #[command(subcommand)]
    Version(VersionCommand),
    /// Manage test cases
    #[command(subcommand)]
    Case(CaseCommand),
    /// Manage test runs and the case versions they include
    #[command(subcommand)]
    Run(RunCommand),
    /// Record test results
    #[command(subcommand, name = "result")]
    Results(ResultCommand),
    /// Summarize recorded results
    #[command(subcommand)]
    Report(ReportCommand),
}

/// Request-style list parameters, e.g. `-p filter-name=firefox -p sortfield=name`
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Add {
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Permission to grant (repeatable)
        #[arg(long = "permission")]
        permissions: Vec<Permission>,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Add one environment from `Category=Element` pairs
    Add {
        #[arg(required = true, value_parser = parse_element)]
        elements: Vec<(String, String)>,
    },
    /// Add every combination of `Category=Element,Element,...`
    Generate {
        #[arg(required = true, value_parser = parse_category)]
        categories: Vec<(String, Vec<String>)>,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProductCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Also create this first version
        #[arg(long)]
        version: Option<String>,
    },
    Edit {
        id: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Show {
        id: String,
    },
    List(ListArgs),
}

#[derive(Subcommand, Debug)]
pub enum VersionCommand {
    Add {
        product: String,
        version: String,
        #[arg(long, default_value = "")]
        codename: String,
    },
    List {
        /// Only versions of this product
        #[arg(long)]
        product: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    AddEnv(EnvChange),
    RemoveEnv(EnvChange),
}

#[derive(Subcommand, Debug)]
pub enum CaseCommand {
    /// Add a case with its first case version
    Add {
        productversion: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Append a step to a case version
    Step {
        caseversion: String,
        instruction: String,
        #[arg(long, default_value = "")]
        expected: String,
    },
    List(ListArgs),
    AddEnv(EnvChange),
    RemoveEnv(EnvChange),
}

#[derive(Subcommand, Debug)]
pub enum RunCommand {
    Add {
        productversion: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List(ListArgs),
    Activate {
        id: String,
    },
    Disable {
        id: String,
    },
    AddEnv(EnvChange),
    RemoveEnv(EnvChange),
    /// Add environments directly to a run case version
    RcvAddEnv(EnvChange),
    /// Remove environments directly from a run case version
    RcvRemoveEnv(EnvChange),
    /// Include a case version in a run
    Include {
        run: String,
        caseversion: String,
    },
    /// Drop a run case version and its results
    Exclude {
        runcaseversion: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ResultCommand {
    /// Assign a tester to an environment of a run case version
    Assign {
        runcaseversion: String,
        environment: String,
        tester: String,
    },
    /// Start testing as the acting user
    Start {
        runcaseversion: String,
        environment: String,
    },
    Pass {
        result: String,
    },
    Fail {
        result: String,
        #[arg(long, default_value = "")]
        comment: String,
        /// Failed step with an optional bug URL: `STEP` or `STEP=URL`
        #[arg(long = "step", value_parser = parse_failed_step)]
        steps: Vec<(u32, Option<String>)>,
    },
    Invalidate {
        result: String,
        #[arg(long, default_value = "")]
        comment: String,
    },
    List {
        runcaseversion: String,
        #[command(flatten)]
        list: ListArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Summary, completion, bugs and testers of one run case version
    Rcv {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Rollup over every run case version of a run
    Run {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

/// Target id plus the environments to add or remove
#[derive(Args, Debug)]
pub struct EnvChange {
    pub id: String,
    #[arg(required = true)]
    pub environments: Vec<String>,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}

fn parse_element(s: &str) -> Result<(String, String), String> {
    model::environment::parse_element(s).ok_or_else(|| format!("expected Category=Element, got `{s}`"))
}

fn parse_category(s: &str) -> Result<(String, Vec<String>), String> {
    let (category, elements) = s
        .split_once('=')
        .ok_or_else(|| format!("expected Category=A,B,..., got `{s}`"))?;
    let elements: Vec<String> = elements
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect();
    if category.trim().is_empty() || elements.is_empty() {
        return Err(format!("expected Category=A,B,..., got `{s}`"));
    }
    Ok((category.trim().to_string(), elements))
}

fn parse_failed_step(s: &str) -> Result<(u32, Option<String>), String> {
    let (number, url) = match s.split_once('=') {
        Some((number, url)) => (number, Some(url.trim().to_string())),
        None => (s, None),
    };
    let number = number
        .trim()
        .parse()
        .map_err(|_| format!("step number expected, got `{number}`"))?;
    Ok((number, url.filter(|u| !u.is_empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category() {
        assert_eq!(
            parse_category("OS=Linux, OS X").unwrap(),
            ("OS".to_string(), vec!["Linux".to_string(), "OS X".to_string()])
        );
        assert!(parse_category("OS=").is_err());
        assert!(parse_category("Linux").is_err());
    }

    #[test]
    fn test_parse_failed_step() {
        assert_eq!(parse_failed_step("2").unwrap(), (2, None));
        assert_eq!(
            parse_failed_step("3=http://bugs/1").unwrap(),
            (3, Some("http://bugs/1".to_string()))
        );
        assert!(parse_failed_step("two").is_err());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("filter-name=fire").unwrap(),
            ("filter-name".to_string(), "fire".to_string())
        );
        assert!(parse_param("sortfield").is_err());
    }
}
