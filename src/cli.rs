use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::info;

use crate::{
    bridge::Bridge,
    cli_types::{AnalyzeArgs, Commands, IndexArgs, SelectionArgs},
    config::BridgeConfig,
    decoder::RelatedFileRecord,
    orchestrator::{AnalysisOrchestrator, AnalysisResult},
    report,
};

pub struct CliApp {
    config: BridgeConfig,
    bridge: Arc<Bridge>,
    verbose: bool,
    json: bool,
}

impl CliApp {
    pub fn new(config: BridgeConfig, verbose: bool, json: bool, colors_enabled: bool) -> Self {
        info!("Initializing contextpilot bridge");
        colored::control::set_override(colors_enabled);

        let bridge = Arc::new(Bridge::new(config.clone()));
        Self::with_bridge(config, bridge, verbose, json)
    }

    pub fn with_bridge(config: BridgeConfig, bridge: Arc<Bridge>, verbose: bool, json: bool) -> Self {
        Self {
            config,
            bridge,
            verbose,
            json,
        }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Check => self.check().await,
            Commands::Index(args) => self.index(args).await,
            Commands::Related(args) => self.related(args).await,
            Commands::Commits(args) => self.commits(args).await,
            Commands::History(args) => self.history(args).await,
            Commands::Analyze(args) => self.analyze(args).await,
        }
    }

    pub async fn check(&self) -> Result<()> {
        let tool = self.bridge.tool().await?;

        if self.json {
            return self.print_json(&serde_json::json!({
                "path": tool.executable_path(),
                "version": tool.version().to_string(),
                "validated_at": tool.validated_at(),
            }));
        }

        self.print_success(&format!(
            "{} {} at {}",
            self.config.tool_name,
            tool.version(),
            tool.executable_path()
        ));
        if self.verbose {
            self.print_info(&format!("Minimum required version: {}", self.config.min_version));
        }
        Ok(())
    }

    pub async fn index(&self, args: IndexArgs) -> Result<()> {
        let start_time = Instant::now();

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {msg}")
                .context("Invalid progress template")?
                .progress_chars("=> "),
        );
        if self.json {
            bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        }

        // The bar position is the wrapped display fraction, not real completion.
        let summary = self
            .bridge
            .index_workspace(&args.workspace, |event| {
                bar.set_position((event.fraction * 100.0) as u64);
                bar.set_message(format!("Indexed {} files...", event.files_indexed));
            })
            .await;
        bar.finish_and_clear();
        let summary = summary.with_context(|| format!("Failed to index {}", args.workspace.display()))?;

        if self.json {
            return self.print_json(&summary);
        }
        self.print_success(&format!(
            "Successfully indexed workspace ({} files)",
            summary.files_indexed
        ));
        if self.verbose {
            self.print_info(&format!("Indexing took {:?}", start_time.elapsed()));
        }
        Ok(())
    }

    pub async fn related(&self, args: SelectionArgs) -> Result<()> {
        let selection = args.to_selection()?;
        let files = self.bridge.related_files(&selection).await?;

        if self.json {
            return self.print_json(&files);
        }
        if files.is_empty() {
            self.print_info("No related files found");
            return Ok(());
        }

        self.print_header(&format!("Related Files ({})", files.len()));
        for file in &files {
            println!("{}", format_related(file));
        }
        Ok(())
    }

    pub async fn commits(&self, args: SelectionArgs) -> Result<()> {
        let selection = args.to_selection()?;
        let commits = self.bridge.commit_descriptions(&selection).await?;

        if self.json {
            return self.print_json(&commits);
        }
        if commits.is_empty() {
            self.print_info("No commits found for the selected code");
            return Ok(());
        }
        print!("{}", report::commit_descriptions_markdown(&selection, &commits));
        Ok(())
    }

    pub async fn history(&self, args: SelectionArgs) -> Result<()> {
        let selection = args.to_selection()?;
        let history = self.bridge.commit_history(&selection).await?;

        if self.json {
            return self.print_json(&history);
        }
        if history.is_empty() {
            self.print_info("No diffs found for the selected code");
            return Ok(());
        }
        if self.verbose {
            self.print_info(&report::report_file_name("Git History", selection.file_path()));
        }
        print!("{}", report::history_markdown(&selection, &history));
        Ok(())
    }

    pub async fn analyze(&self, args: AnalyzeArgs) -> Result<()> {
        let selection = args.selection.to_selection()?;

        if args.index_first || self.config.index_on_startup {
            if let Some(summary) = self.bridge.index_on_startup(selection.workspace_root()).await {
                if self.verbose {
                    self.print_info(&format!("Indexed {} files first", summary.files_indexed));
                }
            }
        }

        let orchestrator = AnalysisOrchestrator::new(self.bridge.clone(), Handle::current());
        let (handle, result) = orchestrator.analyze_to_channel(selection);
        let result = result.await.context("Analysis run ended without a result")?;
        handle.wait().await;

        if self.json {
            return self.print_json(&result);
        }
        self.display_analysis(&result);
        Ok(())
    }

    fn display_analysis(&self, result: &AnalysisResult) {
        self.print_header("Current Changes");
        if result.diffs.is_empty() {
            self.print_info("No uncommitted changes");
        }
        for diff in &result.diffs {
            println!("{}", diff.patch.trim_end());
        }

        self.print_header(&format!("Related Files ({})", result.context_files.len()));
        for file in &result.context_files {
            println!("{}", format_related(file));
        }

        self.print_header(&format!("Commits ({})", result.commits.len()));
        for commit in &result.commits {
            println!(
                "{} {} {}",
                commit.commit_hash().yellow(),
                commit.title.bold(),
                format!("({}, {})", commit.author, commit.formatted_date()).dimmed()
            );
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize output to JSON")?;
        println!("{}", json);
        Ok(())
    }

    // Utility methods for consistent output formatting
    fn print_header(&self, title: &str) {
        println!("\n{}", title.bold().underline());
    }

    fn print_success(&self, message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    fn print_info(&self, message: &str) {
        println!("{}", message.cyan());
    }
}

fn format_related(file: &RelatedFileRecord) -> String {
    format!(
        "{} {} {}",
        file.file_name().bold(),
        file.parent_path().dimmed(),
        format!("({} matches)", file.occurrence_count).bright_black()
    )
}
