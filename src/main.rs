// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GAUNTLET CLI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Uso:
//   gauntlet-cli "Consenso em sistemas distribuídos"
//   gauntlet-cli --plan "tópico"                 (só a prévia do plano)
//   gauntlet-cli --refine "pergunta"             (reformulações)
//   gauntlet-cli --iterations 3 "tópico"
//   gauntlet-cli --resume <sessão> --iterations 8
//   gauntlet-cli --report-now <sessão>
//
// Ctrl-C pede parada cooperativa; o relatório parcial é gravado mesmo assim.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use anyhow::{bail, Context};
use gauntlet::agent::{
    CheckpointStore, LocalCheckpointStore, ResearchEvent, ResearchLoop, ResearchState, StopHandle,
    Termination,
};
use gauntlet::config::{
    create_tokio_runtime, install_panic_hook, load_runtime_config, Credentials, ResearchConfig,
};
use gauntlet::llm::{LlmClient, OpenAiClient};
use gauntlet::search::{AcademicClient, JinaClient, SearchClient, SemanticScholarClient};
use gauntlet::types::Constraints;
use std::path::PathBuf;
use std::sync::Arc;

/// Modo de execução escolhido pela linha de comando
#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Run(String),
    Plan(String),
    Refine(String),
    Resume(String),
    ReportNow(String),
}

#[derive(Debug, Clone)]
struct CliArgs {
    mode: Mode,
    iterations: Option<u32>,
    session: Option<String>,
    out: Option<PathBuf>,
    settings: Option<PathBuf>,
    constraints: Constraints,
}

fn print_usage(program: &str) {
    eprintln!("Gauntlet CLI v{}", gauntlet::VERSION);
    eprintln!();
    eprintln!("Uso: {} [opções] <tópico>", program);
    eprintln!();
    eprintln!("Opções:");
    eprintln!("  --plan                 Só mostra as perguntas planejadas");
    eprintln!("  --refine               Reformula uma pergunta");
    eprintln!("  --iterations <n>       Teto de iterações (padrão: GAUNTLET_MAX_ITERATIONS ou 5)");
    eprintln!("  --session <id>         Id da sessão (padrão: uuid novo)");
    eprintln!("  --resume <id>          Retoma a sessão do último checkpoint");
    eprintln!("  --report-now <id>      Gera o relatório com o que a sessão já tem");
    eprintln!("  --constraint <k=v>     Restrição da pesquisa (repetível)");
    eprintln!("  --settings <arquivo>   settings.json com ajustes do loop");
    eprintln!("  --out <arquivo>        Destino do relatório (padrão: report_<sessão>.md)");
}

fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut iter = args.iter().skip(1);
    let mut plan = false;
    let mut refine = false;
    let mut resume = None;
    let mut report_now = None;
    let mut iterations = None;
    let mut session = None;
    let mut out = None;
    let mut settings = None;
    let mut constraints = Constraints::new();
    let mut words = Vec::new();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} requer um valor", flag))
        };
        match arg.as_str() {
            "--plan" => plan = true,
            "--refine" => refine = true,
            "--iterations" => {
                let raw = value("--iterations")?;
                iterations = Some(raw.parse::<u32>().with_context(|| format!("--iterations inválido: {}", raw))?);
            }
            "--session" => session = Some(value("--session")?),
            "--resume" => resume = Some(value("--resume")?),
            "--report-now" => report_now = Some(value("--report-now")?),
            "--out" => out = Some(PathBuf::from(value("--out")?)),
            "--settings" => settings = Some(PathBuf::from(value("--settings")?)),
            "--constraint" => {
                let raw = value("--constraint")?;
                let Some((k, v)) = raw.split_once('=') else {
                    bail!("--constraint espera chave=valor, recebeu '{}'", raw);
                };
                constraints.insert(k.trim().to_string(), v.trim().to_string());
            }
            other if other.starts_with("--") => bail!("opção desconhecida: {}", other),
            other => words.push(other.to_string()),
        }
    }

    let text = words.join(" ");
    let mode = match (resume, report_now) {
        (Some(id), _) => Mode::Resume(id),
        (None, Some(id)) => Mode::ReportNow(id),
        (None, None) if text.trim().is_empty() => bail!("nenhum tópico informado"),
        (None, None) if plan => Mode::Plan(text),
        (None, None) if refine => Mode::Refine(text),
        (None, None) => Mode::Run(text),
    };

    Ok(CliArgs {
        mode,
        iterations,
        session,
        out,
        settings,
        constraints,
    })
}

fn main() -> anyhow::Result<()> {
    // .env antes de qualquer leitura de configuração
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("✓ Carregado .env de: {:?}", path),
        Err(_) => eprintln!("⚠ Nenhum arquivo .env encontrado; usando apenas o ambiente"),
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    install_panic_hook();

    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("✗ {}", e);
            eprintln!();
            print_usage(args.first().map(String::as_str).unwrap_or("gauntlet-cli"));
            std::process::exit(1);
        }
    };

    // padrões < settings.json < variáveis de ambiente
    let config = match &cli.settings {
        Some(path) => ResearchConfig::from_json_file(path)?.with_env_overrides(),
        None => ResearchConfig::from_env(),
    };
    config.validate().context("configuração inválida")?;

    // Credencial ausente é fatal antes do loop começar
    let credentials = Credentials::from_env().context("credenciais ausentes")?;
    log::debug!("{:?}", credentials);

    let runtime = create_tokio_runtime(&load_runtime_config())?;
    runtime.block_on(run(cli, config, credentials))
}

async fn run(cli: CliArgs, config: ResearchConfig, credentials: Credentials) -> anyhow::Result<()> {
    let mut llm = OpenAiClient::new(credentials.llm_api_key.clone());
    if let Some(base) = &credentials.llm_api_base {
        llm = llm.with_api_base(base);
    }
    let llm_client: Arc<dyn LlmClient> = Arc::new(llm);
    let search_client: Arc<dyn SearchClient> = Arc::new(JinaClient::new(
        credentials.search_api_key.clone(),
        config.search_timeout,
    ));
    let academic_client: Arc<dyn AcademicClient> = Arc::new(SemanticScholarClient::new(
        credentials.academic_api_key.clone(),
        config.search_timeout,
    ));
    let checkpoints = Arc::new(LocalCheckpointStore::new(config.checkpoint_dir.clone()));

    let stop = StopHandle::new();
    let research = Arc::new(
        ResearchLoop::builder(config)
            .llm_client(llm_client)
            .search_client(search_client)
            .academic_client(academic_client)
            .checkpoints(checkpoints.clone())
            .stop_handle(stop.clone())
            .build()?,
    );

    match cli.mode.clone() {
        Mode::Plan(topic) => {
            let questions = research.start_planning_only(&topic, &cli.constraints).await;
            println!("📋 Plano para: {}", topic);
            for q in &questions {
                println!("  {}. [p{}] {}", q.id, q.priority, q.text);
            }
            Ok(())
        }
        Mode::Refine(question) => {
            for (i, option) in research.refine_question(&question).await.iter().enumerate() {
                println!("  {}. {}", i + 1, option);
            }
            Ok(())
        }
        Mode::ReportNow(session) => {
            let Some(state) = checkpoints.load(&session).await? else {
                bail!("sessão {} não encontrada em {:?}", session, checkpoints.dir());
            };
            let report = research.generate_report_now(&state).await;
            write_report(&cli, &state.session_id, &report)
        }
        Mode::Resume(session) => {
            spawn_ctrl_c(stop);
            let outcome = research.resume(&session, cli.iterations).await?;
            finish(&research, &cli, outcome).await
        }
        Mode::Run(topic) => {
            let mut state = ResearchState::new(topic, cli.constraints.clone());
            if let Some(id) = &cli.session {
                state = state.with_session_id(id.clone());
            }
            println!("🔬 Sessão {}: {}", state.session_id, state.topic);

            spawn_ctrl_c(stop);
            let (handle, mut events) = research.run_stream(state, cli.iterations);
            while let Some(event) = events.recv().await {
                print_event(&event);
            }
            let outcome = handle.await??;
            finish(&research, &cli, outcome).await
        }
    }
}

fn spawn_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️ Ctrl-C: parando após a fase atual...");
            stop.request();
        }
    });
}

fn print_event(event: &ResearchEvent) {
    match event {
        ResearchEvent::Transition {
            phase,
            iteration,
            delta,
        } => {
            for line in &delta.logs {
                println!("[it {} | {}] {}", iteration, phase, line);
            }
        }
        ResearchEvent::Report { .. } => println!("📝 Relatório pronto"),
        ResearchEvent::Stopped { iteration } => println!("⏹️ Parado na iteração {}", iteration),
        ResearchEvent::Error { message } => eprintln!("✗ {}", message),
    }
}

async fn finish(
    research: &ResearchLoop,
    cli: &CliArgs,
    outcome: gauntlet::agent::RunOutcome,
) -> anyhow::Result<()> {
    let state = &outcome.state;
    let report = match (&state.final_report, outcome.termination) {
        (Some(report), _) if state.is_complete => report.clone(),
        // parada ou estado sem relatório: relatório parcial sinalizado
        _ => research.generate_report_now(state).await,
    };

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(" RESUMO");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Término:    {:?}", outcome.termination);
    println!("Iterações:  {}", state.iteration_count);
    println!("Perguntas:  {}", state.questions.len());
    println!("Fontes:     {}", state.sources.len());
    println!("Fragmentos: {}", state.knowledge_fragments.len());
    println!("Tokens:");
    for (key, usage) in &state.token_usage {
        println!("    - {}: {} (in {}, out {})", key, usage.total, usage.input, usage.output);
    }
    let stats = research.token_tracker().stats();
    println!(
        "Chamadas:   {} ao modelo (in {}, out {}, total {})",
        stats.calls, stats.input_tokens, stats.output_tokens, stats.total_tokens
    );
    if outcome.termination == Termination::CeilingReached {
        println!(
            "ℹ️ Teto atingido; estenda com --resume {} --iterations <n>",
            state.session_id
        );
    }

    write_report(cli, &state.session_id, &report)
}

fn write_report(cli: &CliArgs, session_id: &str, report: &str) -> anyhow::Result<()> {
    let path = cli
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("report_{}.md", session_id)));
    std::fs::write(&path, report).with_context(|| format!("falha ao gravar {:?}", path))?;
    println!("✓ Relatório gravado em {}", path.display());
    Ok(())
}
