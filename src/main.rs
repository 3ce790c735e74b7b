//! factdesk CLI: fact-check suspicious messages.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use factdesk::archive::JsonArchive;
use factdesk::config::DeskConfig;
use factdesk::draft::Draft;
use factdesk::knowledge::{
    ArticlePage, ArticleQuery, CofactsClient, InMemoryStore, KnowledgeStore, parse_reference,
};
use factdesk::llm::{LanguageModel, OllamaClient};
use factdesk::orchestrator::{
    CaseInput, Collaborators, Finalized, LlmDecomposer, LlmWriter, Orchestrator, Outcome,
    SentenceDecomposer, TemplateWriter,
};
use factdesk::paths::DeskPaths;
use factdesk::review::{ProfileReviewer, Reviewer, ViewpointRegistry, profile::ProfileSource};
use factdesk::submit::{ReplySubmission, ReplySubmitter, UnauthenticatedSubmitter};
use factdesk::tools::{PageVerifier, WebResearcher};

#[derive(Parser)]
#[command(name = "factdesk", version, about = "Fact-check desk for suspicious viral messages")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/factdesk/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a message and draft a reply.
    Check {
        /// Cofacts article id or URL.
        #[arg(long, required_unless_present = "text")]
        article: Option<String>,

        /// Raw message text.
        #[arg(long)]
        text: Option<String>,

        /// Extra context for the case (repeatable).
        #[arg(long)]
        context: Vec<String>,

        /// Print the reply as JSON.
        #[arg(long)]
        json: bool,

        /// Archive the finalized case under the data directory.
        #[arg(long)]
        save: bool,

        /// Show what would be submitted to Cofacts.
        #[arg(long)]
        submit: bool,
    },

    /// Show one knowledge-store article.
    Article {
        /// Article id or URL.
        reference: String,
    },

    /// Find articles similar to a text.
    Search {
        text: String,

        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Recent articles most in need of a reply.
    Trending {
        #[arg(long, default_value = "7")]
        days: u32,

        /// Only articles with fewer replies than this.
        #[arg(long, default_value = "1")]
        max_replies: u32,

        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// List the reviewer viewpoints.
    Viewpoints,

    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with the defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = DeskPaths::resolve()?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    miette::bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                DeskConfig::default().save(&config_path)?;
                println!("Wrote default configuration to {}", config_path.display());
                Ok(())
            }
            ConfigAction::Show => {
                let config = DeskConfig::load_or_default(&config_path)?;
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
                Ok(())
            }
        };
    }

    let config = DeskConfig::load_or_default(&config_path)?;

    match cli.command {
        Commands::Check {
            article,
            text,
            context,
            json,
            save,
            submit,
        } => {
            let mut desk = Orchestrator::new((&config).into(), collaborators(&config)?);
            if save {
                paths.ensure_dirs()?;
                desk = desk.with_archive(Arc::new(JsonArchive::new(paths.cases_dir())));
            }
            let input = CaseInput {
                reference: article,
                text,
                context,
            };

            let mut outcome = desk.process(input)?;
            let done = loop {
                match outcome {
                    Outcome::Final(done) => break done,
                    Outcome::AwaitingInput(waiting) => {
                        eprintln!("{}", waiting.prompt);
                        eprint!("> ");
                        std::io::stderr().flush().into_diagnostic()?;
                        let mut line = String::new();
                        let read = std::io::stdin().lock().read_line(&mut line).into_diagnostic()?;
                        let turn = if read == 0 { "go" } else { line.trim() };
                        outcome = desk.resume(waiting, turn)?;
                    }
                }
            };

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&done.draft.reply()).into_diagnostic()?
                );
            } else {
                print_finalized(&done);
            }

            if submit {
                let Some(article_id) = done.case.article_id.as_deref() else {
                    miette::bail!("only replies to a Cofacts article can be submitted");
                };
                let receipt = UnauthenticatedSubmitter.submit(&ReplySubmission::new(article_id, &done.draft))?;
                println!("{}", serde_json::to_string_pretty(&receipt).into_diagnostic()?);
            }
        }

        Commands::Article { reference } => {
            let Some(id) = parse_reference(&reference) else {
                miette::bail!("not an article id or Cofacts article URL: {reference}");
            };
            let store = knowledge_store(&config)?;
            let article = store.get_by_id(&id)?;

            println!("Article {} ({})", article.id, article.url());
            if let Some(kind) = &article.article_type {
                println!("  type: {kind}");
            }
            if let Some(created) = &article.created_at {
                println!("  created: {created}");
            }
            println!(
                "  requests: {}  replies: {}",
                article.reply_request_count, article.reply_count
            );
            println!("\n{}\n", article.text.trim());
            for link in &article.hyperlinks {
                println!("  link: {}", link.url);
            }
            for reason in article.additional_context() {
                println!("  context: {reason}");
            }
            for (feedback, reply) in article.replies() {
                println!(
                    "\n  [{}] reply {} (helpful ratio {:.2})",
                    reply.reply_type,
                    reply.id,
                    feedback.helpful_ratio()
                );
                println!("  {}", clip(&reply.text, 300).replace('\n', "\n  "));
            }
        }

        Commands::Search { text, limit } => {
            let store = knowledge_store(&config)?;
            let page = store.search(&ArticleQuery::similar_to(&text).limit(limit))?;
            print_page(&page);
        }

        Commands::Trending {
            days,
            max_replies,
            limit,
        } => {
            let store = knowledge_store(&config)?;
            let page = store.search(&ArticleQuery::trending(days, max_replies).limit(limit))?;
            print_page(&page);
        }

        Commands::Viewpoints => {
            let registry = registry(&config);
            if registry.is_empty() {
                println!("No viewpoints loaded.");
            }
            for (profile, source) in registry.list() {
                let origin = match source {
                    ProfileSource::Bundled => "bundled".to_string(),
                    ProfileSource::External(path) => path.display().to_string(),
                };
                println!("{}: {} [{origin}]", profile.id, profile.name);
                println!("  for: {}", profile.constituency);
                for question in &profile.focus_questions {
                    println!("  ? {question}");
                }
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn knowledge_store(config: &DeskConfig) -> Result<Arc<dyn KnowledgeStore>> {
    Ok(match &config.knowledge.fixture {
        Some(path) => Arc::new(InMemoryStore::from_json_file(path)?),
        None => Arc::new(CofactsClient::new(config.knowledge.clone())),
    })
}

fn registry(config: &DeskConfig) -> ViewpointRegistry {
    match &config.viewpoints_dir {
        Some(dir) => ViewpointRegistry::discover(dir),
        None => ViewpointRegistry::bundled(),
    }
}

fn collaborators(config: &DeskConfig) -> Result<Collaborators> {
    let mut ollama = OllamaClient::new(config.llm.clone());
    let model_ready = ollama.probe();
    if !model_ready {
        tracing::warn!(
            model = %ollama.model(),
            "language model unavailable, using sentence splitting and template replies"
        );
    }
    let llm: Arc<dyn LanguageModel> = Arc::new(ollama);

    let reviewers: Vec<Arc<dyn Reviewer>> = registry(config)
        .profiles()
        .map(|p| Arc::new(ProfileReviewer::new(p.clone(), Arc::clone(&llm))) as Arc<dyn Reviewer>)
        .collect();

    Ok(Collaborators {
        knowledge: knowledge_store(config)?,
        research: Arc::new(WebResearcher::new(config.search.clone(), Arc::clone(&llm))),
        verifier: Arc::new(PageVerifier::new(
            Arc::clone(&llm),
            Duration::from_secs(config.timeouts.verify),
        )),
        reviewers,
        decomposer: if model_ready {
            Arc::new(LlmDecomposer::new(Arc::clone(&llm)))
        } else {
            Arc::new(SentenceDecomposer)
        },
        writer: if model_ready {
            Arc::new(LlmWriter::new(llm))
        } else {
            Arc::new(TemplateWriter)
        },
    })
}

fn print_finalized(done: &Finalized) {
    let draft: &Draft = &done.draft;
    println!("Case {} → {}", done.case.id, draft.classification());
    println!("\n{}\n", draft.text());
    if !draft.references().is_empty() {
        println!("References:");
        for reference in draft.references() {
            println!("  {}\n    {}", reference.url, reference.note);
        }
    }
    if !draft.claims().is_empty() {
        println!("\nClaims:");
        for claim in draft.claims() {
            println!("  [{}] {} ({})", claim.status, clip(&claim.text, 120), claim.kind);
        }
    }
    if !done.residual_questions.is_empty() {
        println!("\nStill open:");
        for (reviewer, questions) in &done.residual_questions {
            for question in questions {
                println!("  {reviewer}: {question}");
            }
        }
    }
    let trail: Vec<String> = done.case.trail().iter().map(ToString::to_string).collect();
    println!("\nTrail: {}", trail.join(" → "));
    println!("Calls: {}", done.case.calls().len());
}

fn print_page(page: &ArticlePage) {
    println!("{} matching articles", page.total_count);
    for edge in &page.edges {
        let a = &edge.node;
        let score = edge.score.map(|s| format!(" score {s:.2}")).unwrap_or_default();
        println!(
            "\n{} (requests {}, replies {}){score}",
            a.id, a.reply_request_count, a.reply_count
        );
        println!("  {}", clip(a.text.trim(), 160).replace('\n', " "));
    }
    if let Some(cursor) = &page.page_info.last_cursor {
        println!("\nnext page after: {cursor}");
    }
}

fn clip(text: &str, max: usize) -> String {
    let mut clipped: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        clipped.push('…');
    }
    clipped
}
