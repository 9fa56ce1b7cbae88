// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

use anyhow::Result;
use waveshare_thermal::cli::Cli;
use waveshare_thermal::logging::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level.as_deref())?;
    cli.run()
}
