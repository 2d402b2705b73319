// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn opt(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("repogen")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Repogen Contributors")
        .about("Generate APT, yum/dnf, Alpine, pacman and Homebrew repositories from a directory of packages")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging (RUST_LOG takes precedence)"),
        )
        .subcommand(
            Command::new("generate")
                .about("Scan a directory of packages and generate repository trees")
                .arg(
                    Arg::new("input-dir")
                        .short('i')
                        .long("input-dir")
                        .value_name("DIR")
                        .required(true)
                        .help("Directory to scan for packages"),
                )
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .required(true)
                        .help("Directory the repositories are written to"),
                )
                .arg(opt("origin", "NAME", "Repository origin (APT Origin, RPM repo id)"))
                .arg(opt("label", "NAME", "Repository label (defaults to the origin)"))
                .arg(opt("codename", "NAME", "APT codename"))
                .arg(opt("suite", "NAME", "APT suite (defaults to the codename)"))
                .arg(
                    opt("component", "NAME", "APT component; repeat or separate with commas")
                        .action(ArgAction::Append)
                        .value_delimiter(','),
                )
                .arg(
                    opt("arch", "ARCH", "Only publish these architectures; repeat or separate with commas")
                        .action(ArgAction::Append)
                        .value_delimiter(','),
                )
                .arg(opt("repo-name", "NAME", "Pacman database name (required for pacman packages)"))
                .arg(opt("distro", "DISTRO", "RPM distribution: fedora, centos or rhel"))
                .arg(opt("version", "VERSION", "RPM release directory (e.g. 40); inferred from packages when omitted"))
                .arg(opt("base-url", "URL", "Public URL of the output directory"))
                .arg(opt("gpg-key-url", "URL", "URL of the public GPG key, written as gpgkey= in .repo files"))
                .arg(opt("gpg-key", "PATH", "OpenPGP secret key for APT, RPM and pacman signatures"))
                .arg(opt("gpg-passphrase", "PASSPHRASE", "Passphrase for the OpenPGP key"))
                .arg(opt("rsa-key", "PATH", "RSA private key for Alpine index signatures"))
                .arg(opt("rsa-passphrase", "PASSPHRASE", "Passphrase for the RSA key"))
                .arg(opt("key-name", "NAME", "Key name used in the Alpine signature file name"))
                .arg(
                    Arg::new("incremental")
                        .long("incremental")
                        .action(ArgAction::SetTrue)
                        .help("Merge with the repositories already in the output directory"),
                )
                .arg(opt("timeout", "SECS", "Abort after this many seconds")),
        )
        .subcommand(
            Command::new("export-key")
                .about("Print the public key matching a signing key")
                .arg(opt("gpg-key", "PATH", "OpenPGP secret key (armored or binary)"))
                .arg(opt("rsa-key", "PATH", "RSA private key in PEM format"))
                .arg(opt("passphrase", "PASSPHRASE", "Passphrase for an encrypted key")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"]),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };
    let man_dir = out_dir.join("man");
    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("repogen.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
