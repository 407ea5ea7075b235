//! Clap derive structures for the `wgfleet` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wgfleet -- manage WireGuard peers and routes on your routers
#[derive(Debug, Parser)]
#[command(
    name = "wgfleet",
    version,
    about = "Manage WireGuard router fleets from the command line",
    long_about = "Administer WireGuard interfaces, peers and routes on network routers.\n\n\
        Every device call is serialized, retried on transient failures and\n\
        read through a short-lived cache. `watch` and `monitor` stream live\n\
        traffic and peer presence.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "WGFLEET_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Router address (overrides profile)
    #[arg(long, short = 'H', env = "WGFLEET_HOST", global = true)]
    pub host: Option<String>,

    /// REST port (overrides profile)
    #[arg(long, env = "WGFLEET_PORT", global = true)]
    pub port: Option<u16>,

    /// Login name (overrides profile)
    #[arg(long, short = 'u', env = "WGFLEET_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WGFLEET_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "WGFLEET_INSECURE", global = true)]
    pub insecure: bool,

    /// Talk plain HTTP to the router
    #[arg(long, global = true)]
    pub plain_http: bool,

    /// Per-call timeout in seconds (overrides profile)
    #[arg(long, env = "WGFLEET_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage WireGuard interfaces
    #[command(alias = "if", alias = "i")]
    Interfaces(InterfacesArgs),

    /// Manage WireGuard peers
    #[command(alias = "p")]
    Peers(PeersArgs),

    /// Manage static routes
    #[command(alias = "r")]
    Routes(RoutesArgs),

    /// Stream a realtime topic as JSON lines
    Watch(WatchArgs),

    /// Track peer presence and print online/offline transitions
    Monitor(MonitorArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  INTERFACES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct InterfacesArgs {
    #[command(subcommand)]
    pub command: InterfacesCommand,
}

#[derive(Debug, Subcommand)]
pub enum InterfacesCommand {
    /// List WireGuard interfaces
    #[command(alias = "ls")]
    List {
        /// Skip the cache and read from the device
        #[arg(long)]
        fresh: bool,
    },

    /// Show rx/tx counters of every interface
    Counters {
        /// Only these interfaces (repeat or comma-separate)
        #[arg(long, short = 'n', value_delimiter = ',')]
        name: Vec<String>,
    },

    /// Create a WireGuard interface
    Add {
        /// Interface name (e.g. wg1)
        name: String,

        #[arg(long)]
        listen_port: Option<u16>,

        #[arg(long)]
        mtu: Option<u32>,

        /// Private key (generated by the router when omitted)
        #[arg(long)]
        private_key: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Remove a WireGuard interface
    #[command(alias = "rm")]
    Remove {
        /// Interface name, comment or id
        interface: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PEERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PeersArgs {
    #[command(subcommand)]
    pub command: PeersCommand,
}

#[derive(Debug, Subcommand)]
pub enum PeersCommand {
    /// List peers (all enabled interfaces unless --interface is given)
    #[command(alias = "ls")]
    List {
        #[arg(long, short = 'i')]
        interface: Option<String>,

        /// Only peers with a recent handshake
        #[arg(long, conflicts_with = "offline")]
        online: bool,

        /// Only peers without a recent handshake
        #[arg(long)]
        offline: bool,

        /// Skip the cache and read from the device
        #[arg(long)]
        fresh: bool,
    },

    /// Add a peer
    Add {
        /// Peer public key
        public_key: String,

        #[arg(long, short = 'i')]
        interface: String,

        /// Allowed addresses (repeat or comma-separate)
        #[arg(long, short = 'a', value_delimiter = ',')]
        allowed_address: Vec<String>,

        /// Display name (stored in the comment)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long)]
        endpoint_port: Option<u16>,

        #[arg(long)]
        preshared_key: Option<String>,

        /// Keepalive interval (e.g. 25s)
        #[arg(long)]
        keepalive: Option<String>,

        #[arg(long)]
        comment: Option<String>,

        /// Create the peer disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Change fields of a peer
    Set {
        /// Peer id, public key or comment
        peer: String,

        #[arg(long, short = 'i')]
        interface: String,

        #[arg(long)]
        public_key: Option<String>,

        #[arg(long, short = 'a', value_delimiter = ',')]
        allowed_address: Option<Vec<String>>,

        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long)]
        endpoint_port: Option<u16>,

        #[arg(long)]
        preshared_key: Option<String>,

        #[arg(long)]
        keepalive: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Remove a peer
    #[command(alias = "rm")]
    Remove {
        /// Peer id, public key or comment
        peer: String,

        #[arg(long, short = 'i')]
        interface: String,
    },

    /// Enable a disabled peer
    Enable {
        peer: String,

        #[arg(long, short = 'i')]
        interface: String,
    },

    /// Disable a peer without removing it
    Disable {
        peer: String,

        #[arg(long, short = 'i')]
        interface: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ROUTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RoutesArgs {
    #[command(subcommand)]
    pub command: RoutesCommand,
}

#[derive(Debug, Subcommand)]
pub enum RoutesCommand {
    /// List static and dynamic routes
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        fresh: bool,
    },

    /// Add a static route
    Add {
        /// Destination prefix (e.g. 10.20.0.0/24)
        dst: String,

        /// Gateway address or interface
        #[arg(long, short = 'g')]
        gateway: String,

        #[arg(long)]
        distance: Option<u8>,

        #[arg(long)]
        table: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Remove a route
    #[command(alias = "rm")]
    Remove {
        /// Route id, destination or comment
        route: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH / MONITOR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Topic to stream
    pub topic: WatchTopic,

    /// Stop after this many messages
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WatchTopic {
    /// WAN and WireGuard counters with bit rates
    Traffic,
    /// Peer list of every WireGuard interface with online flags
    Peers,
}

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Poll interval in seconds (overrides config)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Poll once, print the current status and exit
    #[arg(long)]
    pub once: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
