//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::services::push::PushMessage;

// Include shadow-rs generated build information
use shadow_rs::shadow;
shadow!(build);

/// Push notification delivery for OneSignal, Firebase and Web Push
#[derive(Parser, Debug)]
#[command(name = "podpush")]
#[command(about = "Push notification delivery for OneSignal, Firebase and Web Push")]
#[command(long_about = "
podpush sends push notifications through the provider configured in the
[push.provider] section: OneSignal, Firebase Cloud Messaging (HTTP v1) or
browser Web Push with VAPID. Results are printed as JSON.

EXAMPLES:
    # Generate a VAPID key pair for a new Web Push tenant
    podpush keys

    # Check that the configured provider accepts its credentials
    podpush check

    # Send to two devices with custom data
    podpush send --token abc --token def --title \"New episode\" --body \"Episode 42\" --data episodeId=42

    # Send to a topic (FCM) or segment (OneSignal)
    podpush topic --name news --title \"Hi\" --body \"There\"

    # Manage FCM topic subscriptions
    podpush subscribe --topic news --token abc
    podpush unsubscribe --topic news --token abc

    # Use a specific configuration file with verbose logging
    podpush --config /etc/podpush/production.toml --verbose check
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    ///
    /// Load exactly this TOML file instead of the layered files under
    /// `config/`. PODPUSH_* environment variables still apply on top.
    ///
    /// Example: --config /etc/podpush/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects which `{environment}.toml` is layered over `default.toml`.
    ///
    /// Available values: development (dev), staging (stage), production (prod), test
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    ///
    /// Increases log output to debug level. Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    ///
    /// Reduces log output to error level only. Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a VAPID key pair for Web Push
    ///
    /// Prints a JSON object with `public_key` and `private_key` in base64url.
    /// The public key is the browser's `applicationServerKey`.
    Keys,

    /// Initialize the configured provider and report whether it is ready
    ///
    /// For Firebase this performs a real token exchange; for Web Push it
    /// checks that the VAPID keys belong together.
    Check,

    /// Send a notification to device tokens
    ///
    /// Examples:
    ///   podpush send --token abc --title Hi --body There
    ///   podpush send --token "$(cat subscription.json)" --title Hi --body There
    Send {
        /// Device token (Web Push: subscription JSON); repeat for several
        #[arg(short, long = "token", value_name = "TOKEN", required = true)]
        tokens: Vec<String>,

        #[command(flatten)]
        message: MessageArgs,
    },

    /// Send a notification to a topic (FCM) or segment (OneSignal)
    Topic {
        /// Topic or segment name
        #[arg(short, long, value_parser = super::validation::validate_topic_name)]
        name: String,

        #[command(flatten)]
        message: MessageArgs,
    },

    /// Subscribe device tokens to a topic
    Subscribe {
        /// Topic name, with or without the /topics/ prefix
        #[arg(long, value_parser = super::validation::validate_topic_name)]
        topic: String,

        /// Device token; repeat for several
        #[arg(short, long = "token", value_name = "TOKEN", required = true)]
        tokens: Vec<String>,
    },

    /// Unsubscribe device tokens from a topic
    Unsubscribe {
        /// Topic name, with or without the /topics/ prefix
        #[arg(long, value_parser = super::validation::validate_topic_name)]
        topic: String,

        /// Device token; repeat for several
        #[arg(short, long = "token", value_name = "TOKEN", required = true)]
        tokens: Vec<String>,
    },
}

/// Notification content shared by `send` and `topic`
#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// Notification title
    #[arg(long)]
    pub title: String,

    /// Notification body
    #[arg(long)]
    pub body: String,

    /// Image URL (Web Push icon)
    #[arg(long, value_name = "URL")]
    pub image: Option<String>,

    /// Badge count
    #[arg(long)]
    pub badge: Option<u32>,

    /// Sound name
    #[arg(long)]
    pub sound: Option<String>,

    /// Android notification channel
    #[arg(long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// iOS notification category
    #[arg(long)]
    pub category: Option<String>,

    /// Custom data entry as key=value; repeat for several
    #[arg(long = "data", value_name = "KEY=VALUE", value_parser = super::validation::validate_data_pair)]
    pub data: Vec<(String, String)>,
}

impl MessageArgs {
    /// Build the vendor-neutral message from the arguments
    pub fn to_message(&self) -> PushMessage {
        PushMessage {
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.iter().cloned().collect(),
            image_url: self.image.clone(),
            badge: self.badge,
            sound: self.sound.clone(),
            channel_id: self.channel.clone(),
            category: self.category.clone(),
        }
    }
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "test")]
    Test,
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}
