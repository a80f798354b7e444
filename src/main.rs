//! Covid-19 Economic Impact Dashboard - command-line front end
//!
//! Downloads the case counts, reconciles them with the economic table and
//! prints the figures behind each chart for the selected year.

use anyhow::{Context, Result};
use clap::Parser;
use covid_econ_dashboard::config::{parse_alias, DashboardConfig};
use covid_econ_dashboard::data::{
    CountryMatching, FileSourceLoader, MemoizedLoader, Pipeline, PipelineOutput,
    RemoteSourceLoader, SourceLoader, SupportedYear,
};
use covid_econ_dashboard::stats::{CountryValue, DashboardSummary, StatsCalculator};
use covid_econ_dashboard::telemetry::init_tracing;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(
    name = "covid-dashboard",
    version,
    about = "Covid-19 impacts on the global economy (2020-2022)"
)]
struct Cli {
    /// JSON configuration file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    covid_url: Option<String>,

    /// Read case counts from a local CSV instead of downloading them.
    #[arg(long)]
    covid_file: Option<PathBuf>,

    /// Economic indicators CSV (Country, Year, GDP, Unemployment).
    #[arg(long)]
    economic: Option<PathBuf>,

    /// Year to display: 2020, 2021 or 2022.
    #[arg(long)]
    year: Option<SupportedYear>,

    /// How country names are matched: exact or case-fold.
    #[arg(long)]
    country_matching: Option<CountryMatching>,

    /// Country alias FROM=TO, case-source name to economic-source name.
    #[arg(long = "alias", value_parser = parse_alias)]
    aliases: Vec<(String, String)>,

    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Write the selected year's reconciled rows to this CSV file.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,

    /// Read years from stdin; `reload` refetches sources, `quit` exits.
    #[arg(long)]
    interactive: bool,

    #[arg(long)]
    log_json: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Cli {
    fn resolve_config(&self) -> Result<DashboardConfig> {
        let mut config = match &self.config {
            Some(path) => DashboardConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DashboardConfig::default(),
        };

        if let Some(url) = &self.covid_url {
            config.covid_url = url.clone();
        }
        if let Some(path) = &self.covid_file {
            config.covid_file = Some(path.clone());
        }
        if let Some(path) = &self.economic {
            config.economic_path = path.clone();
        }
        if let Some(matching) = self.country_matching {
            config.country_matching = matching;
        }
        if let Some(secs) = self.cache_ttl_secs {
            config.cache_ttl_secs = Some(secs);
        }
        if let Some(year) = self.year {
            config.default_year = year;
        }
        config.aliases.extend(self.aliases.iter().cloned());

        Ok(config)
    }
}

/// Memoized sources plus the reconciled table derived from them.
struct Dashboard {
    loader: MemoizedLoader<Box<dyn SourceLoader>>,
    pipeline: Pipeline,
    output: Option<PipelineOutput>,
}

impl Dashboard {
    fn new(config: &DashboardConfig) -> Result<Self> {
        let source: Box<dyn SourceLoader> = match &config.covid_file {
            Some(path) => Box::new(FileSourceLoader::new(path, &config.economic_path)),
            None => Box::new(RemoteSourceLoader::new(
                &config.covid_url,
                &config.economic_path,
            )?),
        };

        Ok(Self {
            loader: MemoizedLoader::new(source, config.cache_policy()),
            pipeline: Pipeline::new(config.reconcile_options()),
            output: None,
        })
    }

    /// Reuse the reconciled table unless the sources had to be fetched again.
    fn refresh(&mut self) -> Result<&PipelineOutput> {
        let fetches = self.loader.fetch_count();
        let sources = self.loader.load().context("loading sources")?;

        if self.output.is_none() || self.loader.fetch_count() != fetches {
            let output = self.pipeline.run(&sources).context("reconciling sources")?;
            self.output = Some(output);
        }

        self.output
            .as_ref()
            .context("pipeline produced no output")
    }

    fn reload(&mut self) {
        self.loader.invalidate();
        self.output = None;
    }
}

fn show(
    output: &PipelineOutput,
    year: SupportedYear,
    export: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let view = output.table.select_year(year);
    if view.is_empty() {
        warn!(%year, "No reconciled rows for the selected year");
    }
    info!(%year, rows = view.len(), "Selected year");

    if let Some(path) = export {
        view.write_csv(path)
            .with_context(|| format!("exporting to {}", path.display()))?;
    }

    let summary = StatsCalculator::summarize(&view);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_ranking(title: &str, values: &[CountryValue]) {
    println!("{}", title);
    if values.is_empty() {
        println!("  (no data)");
    }
    for (rank, v) in values.iter().enumerate() {
        println!("  {:>2}. {:<32} {:>16.2}", rank + 1, v.country, v.value);
    }
    println!();
}

fn print_summary(summary: &DashboardSummary) {
    println!("Covid-19 Impacts on Global Economy - {}", summary.year);
    println!("{} reconciled rows", summary.rows);
    println!();

    print_ranking("Top 5 countries by confirmed cases", &summary.top_confirmed);
    print_ranking("Top 10 countries by GDP", &summary.top_gdp);
    print_ranking("Top 6 unemployment rates", &summary.top_unemployment);

    println!("Correlation: Covid-19 vs economic indicators");
    print!("  {:<14}", "");
    for label in summary.correlation.labels {
        print!("{:>14}", label);
    }
    println!();
    for (label, row) in summary.correlation.labels.iter().zip(summary.correlation.values) {
        print!("  {:<14}", label);
        for value in row {
            print!("{:>14.2}", value);
        }
        println!();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.log_level);

    let config = cli.resolve_config()?;
    let mut dashboard = Dashboard::new(&config)?;

    let mut year = config.default_year;
    let output = dashboard.refresh()?;
    show(output, year, cli.export.as_ref(), cli.json)?;

    if !cli.interactive {
        return Ok(());
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" => break,
            "reload" => {
                dashboard.reload();
                let output = dashboard.refresh()?;
                show(output, year, cli.export.as_ref(), cli.json)?;
            }
            other => match other.parse::<SupportedYear>() {
                Ok(selected) => {
                    year = selected;
                    let output = dashboard.refresh()?;
                    show(output, year, cli.export.as_ref(), cli.json)?;
                }
                Err(e) => eprintln!("{}", e),
            },
        }
    }

    Ok(())
}
