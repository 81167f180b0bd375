use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use deep_digest::llm::gemini::GeminiProvider;
use deep_digest::summarizer::{Difficulty, QuestionType};
use deep_digest::{
    Config, Error, ExtractError, ExtractedDocument, LlmCapability, ParserRouter, Result,
    RetryPolicy, RetryingLlm, Style, Summarizer, UploadStore,
};

/// Chapter-aware book summaries, quizzes and chat
#[derive(Parser, Debug)]
#[command(name = "deep-digest", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to ./deep-digest.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract text, metadata and chapters, print as JSON
    Extract {
        input: PathBuf,
        /// Print chapter titles only instead of the full document
        #[arg(long, default_value_t = false)]
        titles: bool,
    },
    /// Summarize a whole book chapter by chapter
    Summarize {
        input: PathBuf,
        #[arg(short, long, default_value = "detailed")]
        style: Style,
        #[arg(short, long, default_value = "English")]
        language: String,
    },
    /// Extract memorable quotes
    Quotes {
        input: PathBuf,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Generate quiz questions
    Quiz {
        input: PathBuf,
        #[arg(short, long, default_value = "medium")]
        difficulty: Difficulty,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// multiple_choice, true_false, short_answer (repeatable; default all)
        #[arg(short = 't', long = "type")]
        types: Vec<QuestionType>,
    },
    /// Translate a text file
    Translate {
        input: PathBuf,
        #[arg(short, long)]
        to: String,
    },
    /// Rewrite a text file in another tone
    Tone {
        input: PathBuf,
        #[arg(short, long)]
        tone: String,
    },
    /// Ask questions about a book interactively
    Chat { input: PathBuf },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deep_digest=info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("错误: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let router = ParserRouter::new();

    match cli.command {
        Commands::Extract { input, titles } => {
            let doc = extract_checked(&router, &config, &input)?;
            if titles {
                for (i, chapter) in doc.chapters.iter().enumerate() {
                    println!("{:>3}. {} ({} words)", i + 1, chapter.title, chapter.word_count);
                }
            } else {
                print_json(&doc)?;
            }
        }
        Commands::Summarize {
            input,
            style,
            language,
        } => {
            let doc = extract_checked(&router, &config, &input)?;
            let uploads = UploadStore::new();
            let upload_id = uploads.insert(doc, input.clone())?;
            let record = uploads
                .get(&upload_id)?
                .ok_or_else(|| Error::Other("上传记录丢失".to_string()))?;

            let summarizer = build_summarizer(&config).await?;
            let progress = |percent: f64, message: &str| {
                info!(percent = percent.round() as u64, "{}", message);
            };
            let summary = summarizer
                .summarize_book(&record.document, style, &language, Some(&progress))
                .await?;

            print_json(&summary)?;
            uploads.set_summary(&upload_id, summary)?;
        }
        Commands::Quotes { input, count } => {
            let doc = extract_checked(&router, &config, &input)?;
            let summarizer = build_summarizer(&config).await?;
            print_json(&summarizer.extract_quotes(&doc.full_text, count).await?)?;
        }
        Commands::Quiz {
            input,
            difficulty,
            count,
            types,
        } => {
            let doc = extract_checked(&router, &config, &input)?;
            let summarizer = build_summarizer(&config).await?;
            let quiz = summarizer
                .generate_quiz(&doc.full_text, difficulty, count, &types)
                .await?;
            print_json(&quiz)?;
        }
        Commands::Translate { input, to } => {
            let doc = extract_checked(&router, &config, &input)?;
            let summarizer = build_summarizer(&config).await?;
            println!("{}", summarizer.translate(&doc.full_text, &to).await?);
        }
        Commands::Tone { input, tone } => {
            let doc = extract_checked(&router, &config, &input)?;
            let summarizer = build_summarizer(&config).await?;
            println!("{}", summarizer.rewrite_tone(&doc.full_text, &tone).await?);
        }
        Commands::Chat { input } => {
            let doc = extract_checked(&router, &config, &input)?;
            let summarizer = build_summarizer(&config).await?;
            chat_loop(&summarizer, &doc).await?;
        }
    }

    Ok(())
}

/// 检查文件大小后提取
fn extract_checked(router: &ParserRouter, config: &Config, input: &Path) -> Result<ExtractedDocument> {
    let size = fs::metadata(input).map_err(ExtractError::from)?.len();
    if size > config.max_file_size_bytes() {
        return Err(Error::Other(format!(
            "文件过大: {} 字节，上限 {} MB",
            size, config.max_file_size_mb
        )));
    }
    Ok(router.extract_path(input)?)
}

/// 选出可用模型并加上重试
async fn build_summarizer(config: &Config) -> Result<Summarizer> {
    if config.gemini_api_key.is_empty() {
        return Err(Error::Other("未设置 GEMINI_API_KEY".to_string()));
    }

    let chain = GeminiProvider::chain_from_config(config)?;
    let provider = chain
        .resolve()
        .await
        .ok_or_else(|| Error::Other("没有配置任何模型".to_string()))?;
    let llm: Arc<dyn LlmCapability> =
        Arc::new(RetryingLlm::new(provider, RetryPolicy::from_config(config)));

    Ok(Summarizer::from_config(llm, config))
}

async fn chat_loop(summarizer: &Summarizer, doc: &ExtractedDocument) -> Result<()> {
    let book_id = doc.filename.replace(' ', "_");
    let session_id = summarizer.start_chat(&book_id, &doc.full_text).await;
    eprintln!("已开始对话（输入空行退出）: {}", doc.title);

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        eprint!("> ");
        io::stderr().flush().map_err(ExtractError::from)?;

        line.clear();
        if stdin.lock().read_line(&mut line).map_err(ExtractError::from)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        match summarizer.send_chat_message(&session_id, question).await {
            Ok(reply) => println!("{}\n", reply),
            Err(e) if !matches!(e, deep_digest::LlmError::QuotaExceeded(_)) => {
                eprintln!("错误: {}", e)
            }
            Err(e) => return Err(e.into()),
        }
    }

    summarizer.end_chat(&session_id).await;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| Error::Other(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
