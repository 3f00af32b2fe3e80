use std::io;
use std::io::Write;
use std::path;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::cli;
use crate::application::cli::Invocation;
use crate::application::cli::Mode;
use crate::application::views::View;
use crate::application::views::ViewManager;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Action;
use crate::domain::models::Author;
use crate::domain::models::BackendPrompt;
use crate::domain::models::Event;
use crate::domain::models::ImageRequest;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::Settings;
use crate::domain::models::SharedBackend;
use crate::domain::services::actions::ActionsService;
use crate::domain::services::attachments;
use crate::domain::services::AppState;
use crate::domain::services::SettingsStore;
use crate::infrastructure::backends::BackendManager;

type ServiceHandle = JoinHandle<Result<()>>;

fn spawn_service(
    backend: SharedBackend,
) -> (
    mpsc::UnboundedSender<Action>,
    mpsc::UnboundedReceiver<Event>,
    ServiceHandle,
) {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

    let handle = tokio::spawn(async move {
        return ActionsService::start(backend, event_tx, &mut action_rx).await;
    });

    return (action_tx, event_rx, handle);
}

fn prompt_marker(out: &mut dyn io::Write) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;

    return Ok(());
}

/// Saves an API key passed through flags or the environment so later runs
/// pick it up on their own.
async fn remember_api_key(config: &Config, store: &SettingsStore, settings: &mut Settings) -> Result<()> {
    let api_key = config.get(ConfigKey::ApiKey);
    if api_key.is_empty() || !settings.auto_save_key || settings.api_key == api_key {
        return Ok(());
    }

    settings.api_key = api_key;
    store.save(settings).await?;
    tracing::debug!(path = ?store.file_path(), "Saved API key to settings");

    return Ok(());
}

/// Runs one action to completion. Ctrl-C stops a generation in progress.
async fn run_single(
    backend: SharedBackend,
    action: Action,
    app_state: &mut AppState,
    view: &mut dyn View,
) -> Result<()> {
    let (action_tx, mut event_rx, service) = spawn_service(backend);
    let is_generation = matches!(action, Action::Generate(_));
    action_tx.send(action)?;

    let mut action_tx = Some(action_tx);
    if !is_generation {
        action_tx = None;
    }

    let mut out = io::stdout();
    loop {
        tokio::select! {
            _ = signal::ctrl_c(), if action_tx.is_some() => {
                if let Some(tx) = &action_tx {
                    tx.send(Action::Abort())?;
                }
            }
            event = event_rx.recv() => {
                let event = match event {
                    Some(event) => event,
                    None => break,
                };

                app_state.handle_event(&event);
                view.render(&event, &mut out)?;

                // Let the service wind down once the session has settled.
                if let Event::StreamFinished(_) = event {
                    action_tx = None;
                }
            }
        }
    }

    service.await??;
    return Ok(());
}

async fn run_chat(
    backend: SharedBackend,
    template: &BackendPrompt,
    settings: &Settings,
    app_state: &mut AppState,
    view: &mut dyn View,
) -> Result<()> {
    let (action_tx, mut event_rx, service) = spawn_service(backend);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = io::stdout();

    writeln!(
        out,
        "Chatting with {}. Type /help for commands. Ctrl+C stops a response, or exits when idle.",
        app_state.model
    )?;
    if settings.auto_refresh_balance {
        action_tx.send(Action::RefreshBalance())?;
    } else {
        prompt_marker(&mut out)?;
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                if !app_state.waiting_for_backend {
                    writeln!(out)?;
                    break;
                }
                action_tx.send(Action::Abort())?;
            }
            line = lines.next_line(), if !app_state.waiting_for_backend => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };

                let text = line.trim();
                if text.is_empty() {
                    prompt_marker(&mut out)?;
                    continue;
                }

                let (should_break, should_continue) =
                    app_state.handle_slash_commands(text, &action_tx)?;
                let notices = app_state.take_notices();
                for notice in notices.iter() {
                    view.notice(notice, &mut out)?;
                }
                if should_break {
                    break;
                }
                if should_continue {
                    if !notices.is_empty() {
                        prompt_marker(&mut out)?;
                    }
                    continue;
                }

                let sources = app_state.take_attachments();
                let image_urls = match attachments::load_all(&sources).await {
                    Ok(image_urls) => image_urls,
                    Err(err) => {
                        let notice = Message::new_with_type(
                            Author::Pollen,
                            MessageType::Error,
                            &err.to_string(),
                        );
                        view.notice(&notice, &mut out)?;
                        prompt_marker(&mut out)?;
                        continue;
                    }
                };

                let mut prompt = app_state.prompt(text, template);
                prompt.attachments = image_urls;
                action_tx.send(Action::Generate(prompt))?;
            }
            event = event_rx.recv() => {
                let event = match event {
                    Some(event) => event,
                    None => break,
                };

                app_state.handle_event(&event);
                view.render(&event, &mut out)?;

                // These close out whatever the last input asked for.
                let settled = matches!(
                    event,
                    Event::GenerationRecorded(_)
                        | Event::BackendMessage(_)
                        | Event::ModelsListed(_)
                        | Event::BalanceUpdated(_)
                );
                if settled && !app_state.waiting_for_backend {
                    prompt_marker(&mut out)?;
                }
            }
        }
    }

    // Stop anything still running, then drain what it reports.
    if action_tx.send(Action::Abort()).is_ok() {
        drop(action_tx);
        while let Some(event) = event_rx.recv().await {
            app_state.handle_event(&event);
            view.render(&event, &mut out)?;
        }
    }

    service.await??;
    return Ok(());
}

/// Generates `count` images. Batches get a fresh seed and a numbered file
/// per image.
async fn run_images(
    backend: SharedBackend,
    request: &ImageRequest,
    output: Option<path::PathBuf>,
    count: u32,
) -> Result<()> {
    let dest = output.unwrap_or_else(|| return cli::default_image_path(request));

    for idx in 1..=count {
        let mut request = request.clone();
        let mut file = dest.clone();
        if count > 1 {
            request.randomize_seed();
            file = cli::numbered_path(&dest, idx);
        }

        println!(
            "Generating {} with {} (seed {})...",
            request.kind(),
            request.model,
            request.seed
        );
        let written = backend.generate_image(&request, &file).await?;
        println!("Saved {written} bytes to {}", file.to_string_lossy());
    }

    return Ok(());
}

pub async fn start(invocation: Invocation) -> Result<()> {
    let Invocation {
        config,
        mode,
        template,
        attachments: sources,
    } = invocation;

    let store = SettingsStore::new(path::PathBuf::from(config.get(ConfigKey::SettingsDir)));
    let mut settings = store.load().await;
    remember_api_key(&config, &store, &mut settings).await?;

    let mut model = config.get(ConfigKey::Model);
    if model.is_empty() {
        model = settings.default_model.to_string();
    }

    let backend = BackendManager::get(&config, &settings)?;
    backend.health_check().await?;

    let mut view = ViewManager::get(config.view()?);
    let mut app_state = AppState::new(&model, settings.max_results);

    match mode {
        Mode::Generate(text) => {
            let image_urls = attachments::load_all(&sources).await?;
            let mut prompt = app_state.prompt(&text, &template);
            prompt.attachments = image_urls;
            run_single(backend, Action::Generate(prompt), &mut app_state, view.as_mut()).await?;
        }
        Mode::Chat => {
            app_state.attachments = sources;
            run_chat(backend, &template, &settings, &mut app_state, view.as_mut()).await?;
        }
        Mode::Models(kind) => {
            run_single(backend, Action::ListModels(kind), &mut app_state, view.as_mut()).await?;
        }
        Mode::Balance => {
            run_single(backend, Action::RefreshBalance(), &mut app_state, view.as_mut()).await?;
        }
        Mode::Image {
            mut request,
            output,
            count,
        } => {
            request.safe = request.safe || settings.content_filter;
            run_images(backend, &request, output, count).await?;
        }
    }

    return Ok(());
}
