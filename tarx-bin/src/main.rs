use std::path::Path;

use anyhow::{bail, Error};

use tarx::restore::{list_contents, open_archive, restore_archive, RestoreOptions};
use tarx_extract::{format_single_line_entry, Flags};

use proxmox_router::cli::*;
use proxmox_schema::api;

#[api(
    input: {
        properties: {
            archive: {
                description: "Archive name, '-' reads from stdin.",
            },
            target: {
                description: "Target directory",
                optional: true,
            },
            "no-overwrite": {
                description: "Fail entries whose target path already exists.",
                optional: true,
                default: false,
            },
            selinux: {
                description: "Restore SELinux labels recorded in the archive.",
                optional: true,
                default: false,
            },
            strict: {
                description: "Stop on errors. Otherwise most errors will simply warn.",
                optional: true,
                default: false,
            },
        },
    },
)]
/// Extract an archive.
fn extract_archive(
    archive: String,
    target: Option<String>,
    no_overwrite: bool,
    selinux: bool,
    strict: bool,
) -> Result<(), Error> {
    let mut flags = Flags::DEFAULT;
    flags.set(Flags::NO_OVERWRITE, no_overwrite);
    flags.set(Flags::WITH_SELINUX, selinux);

    let target = target.as_ref().map_or_else(|| ".", String::as_str);

    let reader = open_archive(&archive)?;
    let summary = restore_archive(
        reader,
        Path::new(target),
        RestoreOptions { flags, strict },
        |path| {
            log::debug!("{:?}", path);
        },
    )?;

    log::debug!(
        "restored {} entries, {} failed, {} tolerated errors",
        summary.entries,
        summary.failed,
        summary.tolerated,
    );

    if !summary.is_ok() {
        bail!("there were errors");
    }

    Ok(())
}

#[api(
    input: {
        properties: {
            archive: {
                description: "Archive name, '-' reads from stdin.",
            },
        },
    },
)]
/// List the contents of an archive.
fn dump_archive(archive: String) -> Result<(), Error> {
    list_contents(open_archive(&archive)?, |header| {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}", format_single_line_entry(header));
        } else {
            log::info!("{:?}", header.path());
        }
    })
}

fn main() {
    init_cli_logger("TARX_LOG", "info");

    let cmd_def = CliCommandMap::new()
        .insert(
            "extract",
            CliCommand::new(&API_METHOD_EXTRACT_ARCHIVE)
                .arg_param(&["archive", "target"])
                .completion_cb("archive", complete_file_name)
                .completion_cb("target", complete_file_name),
        )
        .insert(
            "list",
            CliCommand::new(&API_METHOD_DUMP_ARCHIVE)
                .arg_param(&["archive"])
                .completion_cb("archive", complete_file_name),
        );

    let rpcenv = CliEnvironment::new();
    run_cli_command(cmd_def, rpcenv, None);
}
