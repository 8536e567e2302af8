use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn gate_key_defaults_to_ingest_run() {
    let cli = Cli::try_parse_from(["gr", "gate", "status", "42", "--source", "wasde"]).unwrap();
    let Commands::Gate(GateArgs {
        command: GateCommands::Status(args),
    }) = cli.command
    else {
        panic!("expected gate status");
    };
    assert_eq!(args.key.key(), GateKey::for_run(42, SourceCode::new("wasde")));
    assert!(!args.require_ready);
}

#[test]
fn lineage_nodes_parse_from_arguments() {
    let cli = Cli::try_parse_from([
        "gr",
        "lineage",
        "record",
        "raw.wasde_xml",
        "bronze.wasde_rows.value",
        "--relationship",
        "copies",
        "--run-id",
        "7",
    ])
    .unwrap();
    let Commands::Lineage(LineageArgs {
        command: LineageCommands::Record(args),
    }) = cli.command
    else {
        panic!("expected lineage record");
    };
    assert_eq!(args.source, LineageNode::table("raw", "wasde_xml"));
    assert_eq!(args.target, LineageNode::column("bronze", "wasde_rows", "value"));
    assert_eq!(args.relationship, Relationship::Copies);
    assert_eq!(args.run_id, Some(7));
}

#[test]
fn run_close_status_is_optional() {
    let cli = Cli::try_parse_from([
        "gr", "run", "close", "3", "--fetched", "10", "--failed", "2",
    ])
    .unwrap();
    let Commands::Run(RunArgs {
        command: RunCommands::Close(args),
    }) = cli.command
    else {
        panic!("expected run close");
    };
    assert_eq!(args.status, None);
    assert_eq!((args.fetched, args.failed), (10, 2));
}

#[test]
fn invalid_source_code_rejected() {
    assert!(Cli::try_parse_from(["gr", "series", "list", " wasde"]).is_err());
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["gr", "meta", "tables", "-v", "-p", "/srv/granary"]).unwrap();
    assert!(cli.global.verbose);
    assert_eq!(cli.global.project_dir, "/srv/granary");
}
