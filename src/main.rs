use sentryd::cli::Cli;
use sentryd::supervisor::Supervisor;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse_args();

    let supervisor = match Supervisor::new(&cli) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            std::process::exit(1);
        }
    };

    let exit_code = supervisor.run().await;
    std::process::exit(exit_code);
}
