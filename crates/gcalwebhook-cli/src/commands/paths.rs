//! `paths`: show where state is kept.

use std::io::Write;

use gcalwebhook_core::ConfigPaths;

use crate::error::CliResult;

pub fn run(paths: &ConfigPaths, out: &mut impl Write) -> CliResult<()> {
    writeln!(out, "Config directory: {}", paths.config_dir().display())?;
    writeln!(out, "Tokens:           {}", paths.tokens_file().display())?;
    writeln!(out, "Channels:         {}", paths.channels_file().display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::output;

    #[test]
    fn prints_all_locations() {
        let paths = ConfigPaths::with_dir("/home/u/.config/gcalendar-webhook-cli");
        let mut out = Vec::new();
        run(&paths, &mut out).unwrap();

        insta::assert_snapshot!(output(out).trim_end(), @r"
        Config directory: /home/u/.config/gcalendar-webhook-cli
        Tokens:           /home/u/.config/gcalendar-webhook-cli/tokens.json
        Channels:         /home/u/.config/gcalendar-webhook-cli/channels.json
        ");
    }
}
