#[cfg(test)]
#[path = "preset_test.rs"]
mod tests;

use rand::seq::SliceRandom;

const IMAGE_PROMPT_SAMPLES: [&str; 5] = [
    "A majestic dragon soaring over a mystical forest at sunset, digital art, vibrant colors",
    "A futuristic cityscape with flying cars and neon lights, cyberpunk style",
    "A cute cartoon character exploring a magical garden, animated movie style",
    "An astronaut riding a horse on Mars, surreal art, detailed painting",
    "A serene Japanese garden with cherry blossoms and koi pond, watercolor style",
];

const QUALITY_PREFIX: &str = "High quality, professional, detailed, 4k, masterpiece, ";

/// Ready-made system prompts, each with a prompt to try it out on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumVariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum Preset {
    Creative,
    Code,
    Analysis,
    Translation,
}

impl Preset {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Preset::Creative => {
                return "You are a creative writer. Write in an engaging, descriptive style.";
            }
            Preset::Code => {
                return "You are an expert programmer. Write clean, efficient, and well-documented code.";
            }
            Preset::Analysis => {
                return "You are an analytical thinker. Break down complex topics and provide clear explanations.";
            }
            Preset::Translation => {
                return "You are a professional translator. Provide accurate translations while maintaining cultural context.";
            }
        }
    }

    pub fn sample_prompt(&self) -> &'static str {
        match self {
            Preset::Creative => {
                return "Write a short story about a time traveler who accidentally changes a minor historical event.";
            }
            Preset::Code => {
                return "Write a Python function that takes a list of numbers and returns a dictionary with statistics (mean, median, mode).";
            }
            Preset::Analysis => {
                return "Analyze the impact of artificial intelligence on modern education.";
            }
            Preset::Translation => {
                return "Translate the following English text to Spanish: 'The quick brown fox jumps over the lazy dog.'";
            }
        }
    }
}

pub fn sample_image_prompt() -> &'static str {
    return IMAGE_PROMPT_SAMPLES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(IMAGE_PROMPT_SAMPLES[0]);
}

/// Prefixes an image prompt with quality keywords.
pub fn boost_image_prompt(prompt: &str) -> String {
    return format!("{QUALITY_PREFIX}{prompt}");
}
