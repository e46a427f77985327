use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use sov_builder::pipeline::build;
use sov_builder::pipeline::persist;
use sov_builder::RunOptions;
use sov_builder::TemplateProfile;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sov-builder")]
#[command(about = "Map a client Statement of Values into a carrier SOV template")]
#[command(version)]
struct Cli {
    /// Source SOV workbook (.xlsx)
    source: PathBuf,

    /// Destination template workbook (.xlsx)
    template: PathBuf,

    /// Built-in template profile
    #[arg(long, value_parser = ["crosscover", "amrisc"])]
    profile: Option<String>,

    /// Template profile file (TOML), instead of a built-in profile
    #[arg(long, conflicts_with = "profile")]
    profile_file: Option<PathBuf>,

    /// Run options file (TOML); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Named insured used in the output file name
    #[arg(long)]
    named_insured: Option<String>,

    /// Destination sheet, overriding the profile's
    #[arg(long)]
    sheet: Option<String>,

    /// Start writing at this row instead of appending (implies --no-append)
    #[arg(long)]
    start_row: Option<usize>,

    /// Write from the fixed start row instead of the first empty row
    #[arg(long)]
    no_append: bool,

    /// Output file or directory (defaults to the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also save a copy to this file or directory
    #[arg(long)]
    save_to: Option<PathBuf>,

    /// Log every mapping step
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_options(&self) -> Result<RunOptions> {
        let mut options = match &self.config {
            Some(path) => RunOptions::load(path).with_context(|| format!("Failed to load options from {}", path.display()))?,
            None => RunOptions::default(),
        };
        if self.profile.is_some() {
            options.profile = self.profile.clone();
        }
        if self.named_insured.is_some() {
            options.named_insured = self.named_insured.clone();
        }
        if self.sheet.is_some() {
            options.sheet = self.sheet.clone();
        }
        if self.start_row.is_some() {
            options.start_row = self.start_row;
            options.append = false;
        }
        if self.no_append {
            options.append = false;
        }
        if self.save_to.is_some() {
            options.save_to = self.save_to.clone();
        }
        options.validate()?;
        Ok(options)
    }

    fn template_profile(&self, options: &RunOptions) -> Result<TemplateProfile> {
        let profile = match &self.profile_file {
            Some(path) => TemplateProfile::load(path)?,
            None => TemplateProfile::builtin(options.profile.as_deref().unwrap_or("crosscover"))?,
        };
        Ok(profile)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = cli.run_options()?;
    let profile = cli.template_profile(&options)?;
    info!("Using profile '{}'", profile.name);

    let source = std::fs::read(&cli.source).with_context(|| format!("Failed to read source {}", cli.source.display()))?;
    let template = std::fs::read(&cli.template).with_context(|| format!("Failed to read template {}", cli.template.display()))?;

    let output = build(&source, template, &profile, &options)?;
    print!("{}", output.report);

    let destination = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let written = persist(&output.bytes, &destination, &output.file_name)?;
    println!("Transfer complete: {}", written.display());
    Ok(())
}
