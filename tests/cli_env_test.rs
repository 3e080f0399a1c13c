//! Environment-driven options.
//!
//! Kept in its own test binary with a single test so nothing else reads
//! the process environment while it is being changed.

use clap::Parser;
use envstrap::cli::Cli;

const VARS: &[&str] = &[
    "VERBOSE",
    "ZSH_CUSTOM",
    "ENVSTRAP_MANIFEST",
    "ENVSTRAP_SOURCE_DIR",
    "ENVSTRAP_LOG_LEVEL",
    "ENVSTRAP_DRY_RUN",
];

fn set(key: &str, value: &str) {
    // SAFETY: this binary runs one test, so no other thread touches the environment.
    unsafe { std::env::set_var(key, value) };
}

fn clear(key: &str) {
    // SAFETY: see `set`.
    unsafe { std::env::remove_var(key) };
}

fn parse() -> Cli {
    Cli::try_parse_from(["envstrap"]).unwrap()
}

#[test]
fn options_come_from_environment() {
    for key in VARS {
        clear(key);
    }

    let args = parse();
    assert!(!args.verbose);
    assert!(args.zsh_custom.is_none());

    for (value, expected) in [("1", true), ("yes", true), ("0", false), ("", false), ("false", false)] {
        set("VERBOSE", value);
        assert_eq!(parse().verbose, expected, "VERBOSE={:?}", value);
    }
    clear("VERBOSE");

    set("ZSH_CUSTOM", "/opt/zsh-custom");
    assert_eq!(parse().zsh_custom.unwrap(), "/opt/zsh-custom");

    // A flag wins over the variable.
    let args = Cli::try_parse_from(["envstrap", "--zsh-custom", "/tmp/custom"]).unwrap();
    assert_eq!(args.zsh_custom.unwrap(), "/tmp/custom");
    clear("ZSH_CUSTOM");

    set("ENVSTRAP_DRY_RUN", "1");
    set("ENVSTRAP_SOURCE_DIR", "/srv/dotfiles");
    let args = parse();
    assert!(args.dry_run);
    assert_eq!(args.source_dir.unwrap(), "/srv/dotfiles");

    for key in VARS {
        clear(key);
    }
}
