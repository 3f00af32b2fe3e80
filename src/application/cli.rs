#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use chrono::Local;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use owo_colors::OwoColorize;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::views::ViewName;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::boost_image_prompt;
use crate::domain::models::sample_image_prompt;
use crate::domain::models::BackendPrompt;
use crate::domain::models::ImageRequest;
use crate::domain::models::ModelKind;
use crate::domain::models::Preset;
use crate::domain::services::actions::help_text;
use crate::domain::services::SettingsStore;

/// What the user asked Pollen to do once configuration is resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    Generate(String),
    Chat,
    Models(Option<ModelKind>),
    Balance,
    Image {
        request: ImageRequest,
        output: Option<path::PathBuf>,
        count: u32,
    },
}

pub struct Invocation {
    pub config: Config,
    pub mode: Mode,
    /// Generation options shared by every prompt of the run. The text and
    /// model are filled in per prompt.
    pub template: BackendPrompt,
    /// Image URLs or paths sent with the first prompt.
    pub attachments: Vec<String>,
}

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default_value(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_settings() -> Command {
    return Command::new("settings")
        .about("Manage saved preferences such as the API key and default model.")
        .subcommand(Command::new("show").about("Print the saved settings. The API key is never printed."))
        .subcommand(Command::new("path").about("Print the path of the settings file."))
        .subcommand(Command::new("reset").about("Restore every setting to its default."))
        .subcommand(
            Command::new("export")
                .about("Write the settings, without the API key, to a JSON file.")
                .arg(Arg::new("file").help("Destination file").required(true)),
        )
        .subcommand(
            Command::new("import")
                .about("Merge the settings found in a JSON file into the saved settings.")
                .arg(Arg::new("file").help("Source file").required(true)),
        );
}

fn arg_prompt(required: bool) -> Arg {
    return Arg::new("prompt")
        .help("The prompt to send. Multiple words are joined with spaces.")
        .num_args(1..)
        .required(required);
}

fn arg_system() -> Arg {
    return Arg::new("system")
        .short('s')
        .long("system")
        .num_args(1)
        .help("System prompt sent ahead of the conversation.");
}

fn arg_temperature() -> Arg {
    return Arg::new("temperature")
        .long("temperature")
        .num_args(1)
        .value_parser(value_parser!(f32))
        .help("Sampling temperature between 0 and 2. [default: 1.0]");
}

fn arg_max_tokens() -> Arg {
    return Arg::new("max-tokens")
        .long("max-tokens")
        .num_args(1)
        .value_parser(value_parser!(u32))
        .help("Upper bound on the number of generated tokens.");
}

fn arg_json() -> Arg {
    return Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Ask the model to answer with a JSON object.");
}

fn arg_no_stream() -> Arg {
    return Arg::new("no-stream")
        .long("no-stream")
        .action(ArgAction::SetTrue)
        .help("Wait for the whole response instead of streaming it.");
}

fn arg_attach() -> Arg {
    return Arg::new("attach")
        .short('a')
        .long("attach")
        .num_args(1)
        .action(ArgAction::Append)
        .help("Image URL or local image file to send with the first prompt. Can be repeated.");
}

fn arg_preset() -> Arg {
    return Arg::new("preset")
        .short('p')
        .long("preset")
        .num_args(1)
        .value_parser(PossibleValuesParser::new(Preset::VARIANTS))
        .help("Use a ready-made system prompt. Without a prompt, `generate` also uses the preset's sample prompt.");
}

fn generation_args(cmd: Command) -> Command {
    return cmd
        .arg(arg_system())
        .arg(arg_preset())
        .arg(arg_attach())
        .arg(arg_temperature())
        .arg(arg_max_tokens())
        .arg(arg_json())
        .arg(arg_no_stream());
}

fn subcommand_generate() -> Command {
    return generation_args(
        Command::new("generate")
            .about("Generate text for a single prompt. This is the default when a prompt is given.")
            .arg(arg_prompt(false).required_unless_present("preset")),
    );
}

fn subcommand_chat() -> Command {
    return generation_args(
        Command::new("chat").about("Start an interactive chat. Previous turns are sent with every prompt."),
    );
}

fn subcommand_models() -> Command {
    return Command::new("models").about("List available models.").arg(
        Arg::new("kind")
            .short('k')
            .long("kind")
            .num_args(1)
            .help("Only list models of this kind.")
            .value_parser(PossibleValuesParser::new(ModelKind::VARIANTS)),
    );
}

fn subcommand_image() -> Command {
    return Command::new("image")
        .about("Generate an image, or a video with a video model, and save it to a file.")
        .arg(arg_prompt(false).required_unless_present("sample"))
        .arg(
            Arg::new("sample")
                .long("sample")
                .action(ArgAction::SetTrue)
                .help("Use a random sample prompt when none is given."),
        )
        .arg(
            Arg::new("boost-prompt")
                .long("boost-prompt")
                .action(ArgAction::SetTrue)
                .help("Prefix the prompt with quality keywords."),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .num_args(1)
                .value_parser(value_parser!(u32).range(1..=10))
                .default_value("1")
                .help("Number of images to generate. Each one gets a random seed."),
        )
        .arg(
            Arg::new("random-seed")
                .long("random-seed")
                .action(ArgAction::SetTrue)
                .conflicts_with("seed")
                .help("Pick a random seed instead of --seed."),
        )
        .arg(
            Arg::new("image-model")
                .long("image-model")
                .num_args(1)
                .default_value("flux")
                .help("Image or video model to render with."),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .default_value("1024"),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .default_value("1024"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("negative-prompt")
                .long("negative-prompt")
                .num_args(1)
                .default_value("worst quality, blurry")
                .help("Things the image should avoid."),
        )
        .arg(
            Arg::new("reference-image")
                .long("reference-image")
                .num_args(1)
                .help("URL of an image to start from."),
        )
        .arg(
            Arg::new("enhance")
                .long("enhance")
                .action(ArgAction::SetTrue)
                .help("Let the API rewrite the prompt for better results."),
        )
        .arg(
            Arg::new("safe")
                .long("safe")
                .action(ArgAction::SetTrue)
                .help("Enable the content filter. Defaults to the saved contentFilter setting."),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Video length in seconds. Video models only."),
        )
        .arg(
            Arg::new("aspect-ratio")
                .long("aspect-ratio")
                .num_args(1)
                .help("Video aspect ratio, for example 16:9. Video models only."),
        )
        .arg(
            Arg::new("audio")
                .long("audio")
                .action(ArgAction::SetTrue)
                .help("Generate an audio track. Video models only."),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .num_args(1)
                .help("File to write to. Defaults to a timestamped file in the current directory."),
        );
}

fn arg_config_file() -> Arg {
    return Arg::new(ConfigKey::ConfigFile.to_string())
        .short('c')
        .long(ConfigKey::ConfigFile.to_string())
        .env("POLLEN_CONFIG_FILE")
        .num_args(1)
        .help(format!(
            "Path to configuration file [default: {}]",
            Config::default_value(ConfigKey::ConfigFile)
        ))
        .global(true);
}

fn arg_api_key() -> Arg {
    return Arg::new(ConfigKey::ApiKey.to_string())
        .long(ConfigKey::ApiKey.to_string())
        .env("POLLEN_API_KEY")
        .hide_env_values(true)
        .num_args(1)
        .help("Pollinations API token. Saved to settings when autoSaveKey is enabled.")
        .global(true);
}

fn arg_api_url() -> Arg {
    return Arg::new(ConfigKey::ApiUrl.to_string())
        .long(ConfigKey::ApiUrl.to_string())
        .env("POLLEN_API_URL")
        .num_args(1)
        .help(format!(
            "Pollinations API URL. Can be swapped to a compatible proxy. [default: {}]",
            Config::default_value(ConfigKey::ApiUrl)
        ))
        .global(true);
}

fn arg_health_check_timeout() -> Arg {
    return Arg::new(ConfigKey::HealthCheckTimeout.to_string())
        .long(ConfigKey::HealthCheckTimeout.to_string())
        .env("POLLEN_HEALTH_CHECK_TIMEOUT")
        .num_args(1)
        .help(format!(
            "Time to wait in milliseconds before timing out when checking that the API is reachable. [default: {}]",
            Config::default_value(ConfigKey::HealthCheckTimeout)
        ))
        .global(true);
}

fn arg_model() -> Arg {
    return Arg::new(ConfigKey::Model.to_string())
        .short('m')
        .long(ConfigKey::Model.to_string())
        .env("POLLEN_MODEL")
        .num_args(1)
        .help("The text model to generate with. Defaults to the model saved in settings.")
        .global(true);
}

fn arg_settings_dir() -> Arg {
    return Arg::new(ConfigKey::SettingsDir.to_string())
        .long(ConfigKey::SettingsDir.to_string())
        .env("POLLEN_SETTINGS_DIR")
        .num_args(1)
        .help(format!(
            "Directory holding settings.json. [default: {}]",
            Config::default_value(ConfigKey::SettingsDir)
        ))
        .global(true);
}

fn arg_view() -> Arg {
    return Arg::new(ConfigKey::View.to_string())
        .long(ConfigKey::View.to_string())
        .env("POLLEN_VIEW")
        .num_args(1)
        .help(format!(
            "How generations are rendered. [default: {}]",
            Config::default_value(ConfigKey::View)
        ))
        .value_parser(PossibleValuesParser::new(ViewName::VARIANTS))
        .global(true);
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") || line.starts_with("HOTKEYS:") {
                return format!("CHAT {line}").underline().bold().to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    let cmd = Command::new("pollen")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(subcommand_generate())
        .subcommand(subcommand_chat())
        .subcommand(subcommand_models())
        .subcommand(Command::new("balance").about("Show the account balance."))
        .subcommand(subcommand_image())
        .subcommand(subcommand_settings())
        .subcommand(subcommand_config())
        .subcommand(subcommand_completions())
        .arg(arg_prompt(false))
        .arg(arg_config_file())
        .arg(arg_api_key())
        .arg(arg_api_url())
        .arg(arg_health_check_timeout())
        .arg(arg_model())
        .arg(arg_settings_dir())
        .arg(arg_view());

    return generation_args(cmd);
}

fn prompt_text(matches: &ArgMatches) -> Option<String> {
    let words = matches.get_many::<String>("prompt")?;
    let text = words
        .map(|word| return word.to_string())
        .collect::<Vec<String>>()
        .join(" ");

    if text.trim().is_empty() {
        return None;
    }

    return Some(text);
}

fn preset_from_matches(matches: &ArgMatches) -> Result<Option<Preset>> {
    match matches.try_get_one::<String>("preset") {
        Ok(Some(preset)) => return Ok(Some(preset.parse::<Preset>()?)),
        _ => return Ok(None),
    }
}

fn attachments_from_matches(matches: &ArgMatches) -> Vec<String> {
    match matches.try_get_many::<String>("attach") {
        Ok(Some(sources)) => return sources.map(|e| return e.to_string()).collect(),
        _ => return vec![],
    }
}

/// Generation options from whichever command carried them. An explicit
/// system prompt wins over a preset.
pub fn template_from_matches(matches: &ArgMatches) -> Result<BackendPrompt> {
    let mut template = BackendPrompt::new("", "");
    if let Some(preset) = preset_from_matches(matches)? {
        template.system_prompt = Some(preset.system_prompt().to_string());
    }
    if let Ok(Some(system)) = matches.try_get_one::<String>("system") {
        template.system_prompt = Some(system.to_string());
    }
    if let Ok(Some(temperature)) = matches.try_get_one::<f32>("temperature") {
        template.temperature = *temperature;
    }
    if let Ok(Some(max_tokens)) = matches.try_get_one::<u32>("max-tokens") {
        template.max_tokens = Some(*max_tokens);
    }
    if let Ok(Some(json)) = matches.try_get_one::<bool>("json") {
        template.json_mode = *json;
    }
    if let Ok(Some(no_stream)) = matches.try_get_one::<bool>("no-stream") {
        template.stream = !*no_stream;
    }

    return Ok(template);
}

/// The prompt to generate from, falling back to the preset's sample prompt.
fn generate_prompt(matches: &ArgMatches) -> Result<String> {
    if let Some(prompt) = prompt_text(matches) {
        return Ok(prompt);
    }
    if let Some(preset) = preset_from_matches(matches)? {
        return Ok(preset.sample_prompt().to_string());
    }

    bail!("A prompt is required");
}

pub fn image_from_matches(matches: &ArgMatches) -> Result<Mode> {
    let mut prompt = match prompt_text(matches) {
        Some(prompt) => prompt,
        None if matches.get_flag("sample") => sample_image_prompt().to_string(),
        None => bail!("An image prompt is required"),
    };
    if matches.get_flag("boost-prompt") {
        prompt = boost_image_prompt(&prompt);
    }

    let mut request = ImageRequest::new(&prompt);
    if let Some(model) = matches.get_one::<String>("image-model") {
        request.model = model.to_string();
    }
    if let Some(width) = matches.get_one::<u32>("width") {
        request.width = *width;
    }
    if let Some(height) = matches.get_one::<u32>("height") {
        request.height = *height;
    }
    if let Some(seed) = matches.get_one::<u64>("seed") {
        request.seed = *seed;
    }
    request.negative_prompt = matches.get_one::<String>("negative-prompt").cloned();
    request.reference_image = matches.get_one::<String>("reference-image").cloned();
    request.enhance = matches.get_flag("enhance");
    request.safe = matches.get_flag("safe");
    request.duration = matches.get_one::<u32>("duration").copied();
    request.aspect_ratio = matches.get_one::<String>("aspect-ratio").cloned();
    request.audio = matches.get_flag("audio");
    if matches.get_flag("random-seed") {
        request.randomize_seed();
    }

    let output = matches
        .get_one::<String>("output")
        .map(path::PathBuf::from);
    let count = matches.get_one::<u32>("count").copied().unwrap_or(1);

    return Ok(Mode::Image {
        request,
        output,
        count,
    });
}

/// `file` with `-{idx}` inserted before the extension, for batches.
pub fn numbered_path(file: &path::Path, idx: u32) -> path::PathBuf {
    let stem = file
        .file_stem()
        .map(|e| return e.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match file.extension() {
        Some(extension) => format!("{stem}-{idx}.{}", extension.to_string_lossy()),
        None => format!("{stem}-{idx}"),
    };

    return file.with_file_name(name);
}

/// Default file name for generated media.
pub fn default_image_path(request: &ImageRequest) -> path::PathBuf {
    let extension = match request.kind() {
        ModelKind::Video => "mp4",
        _ => "png",
    };

    return path::PathBuf::from(format!(
        "pollen-{}.{extension}",
        Local::now().format("%Y%m%d-%H%M%S")
    ));
}

async fn handle_settings(config: &Config, matches: &ArgMatches) -> Result<()> {
    let store = SettingsStore::new(path::PathBuf::from(config.get(ConfigKey::SettingsDir)));

    match matches.subcommand() {
        Some(("show", _)) => {
            let settings = store.load().await;
            let has_key = !settings.api_key.is_empty();
            println!("{}", serde_json::to_string_pretty(&settings.exported())?);
            if has_key {
                println!("An API key is saved.");
            }
        }
        Some(("path", _)) => {
            println!("{}", store.file_path().to_string_lossy());
        }
        Some(("reset", _)) => {
            store.reset().await?;
            println!("Settings reset to defaults.");
        }
        Some(("export", export_matches)) => {
            let dest = export_matches.get_one::<String>("file").map(path::PathBuf::from);
            if let Some(dest) = dest {
                store.export_to(&dest).await?;
                println!("Exported settings to {}", dest.to_string_lossy());
            }
        }
        Some(("import", import_matches)) => {
            let src = import_matches.get_one::<String>("file").map(path::PathBuf::from);
            if let Some(src) = src {
                store.import_from(&src).await?;
                println!("Settings imported successfully!");
            }
        }
        _ => {
            subcommand_settings().print_long_help()?;
        }
    }

    return Ok(());
}

/// Resolves the command line. `None` means the command was fully handled and
/// the process can exit.
pub async fn resolve(matches: &ArgMatches) -> Result<Option<Invocation>> {
    let (mode, template) = match matches.subcommand() {
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(None);
        }
        Some(("config", subcmd_matches)) => {
            match subcmd_matches.subcommand() {
                Some(("create", _)) => {
                    create_config_file().await?;
                }
                Some(("default", _)) => {
                    println!("{}", Config::serialize_default(build()));
                }
                Some(("path", _)) => {
                    println!("{}", Config::default_value(ConfigKey::ConfigFile));
                }
                _ => {
                    subcommand_config().print_long_help()?;
                }
            }
            return Ok(None);
        }
        Some(("settings", subcmd_matches)) => {
            let config = Config::load(build(), vec![matches, subcmd_matches]).await?;
            handle_settings(&config, subcmd_matches).await?;
            return Ok(None);
        }
        Some(("generate", subcmd_matches)) => (
            Mode::Generate(generate_prompt(subcmd_matches)?),
            template_from_matches(subcmd_matches)?,
        ),
        Some(("chat", subcmd_matches)) => (Mode::Chat, template_from_matches(subcmd_matches)?),
        Some(("models", subcmd_matches)) => {
            let kind = match subcmd_matches.get_one::<String>("kind") {
                Some(kind) => Some(kind.parse::<ModelKind>()?),
                None => None,
            };
            (Mode::Models(kind), BackendPrompt::new("", ""))
        }
        Some(("balance", _)) => (Mode::Balance, BackendPrompt::new("", "")),
        Some(("image", subcmd_matches)) => {
            (image_from_matches(subcmd_matches)?, BackendPrompt::new("", ""))
        }
        _ => match prompt_text(matches) {
            Some(prompt) => (Mode::Generate(prompt), template_from_matches(matches)?),
            None => (Mode::Chat, template_from_matches(matches)?),
        },
    };

    let mut all_matches = vec![matches];
    let mut attachments = attachments_from_matches(matches);
    if let Some((_, subcmd_matches)) = matches.subcommand() {
        all_matches.push(subcmd_matches);
        attachments.extend(attachments_from_matches(subcmd_matches));
    }
    let config = Config::load(build(), all_matches).await?;

    return Ok(Some(Invocation {
        config,
        mode,
        template,
        attachments,
    }));
}

pub async fn parse() -> Result<Option<Invocation>> {
    let matches = build().get_matches();
    return resolve(&matches).await;
}
