use canvas_cli::cli::Cli;
use canvas_cli::error::CliError;
use canvas_cli::output::{self, OutputFormat, ResultBuilder};
use canvas_cli::{commands, logging};
use clap::Parser;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(command, err, format);
		std::process::exit(1);
	}
}

fn handle_error(command: &str, err: CliError, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// Humans read stderr.
	output::print_error_stderr(&cmd_error);

	// Agents get the envelope on stdout with ok=false.
	if format != OutputFormat::Text {
		let result: output::CommandResult<()> = ResultBuilder::new(command).command_error(cmd_error).build();
		output::print_result(&result, format);
	}
}
