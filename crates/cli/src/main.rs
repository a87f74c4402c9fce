use anyhow::Context;
use clap::{Parser, Subcommand};
use eps_certificates::DevelopmentPki;
use eps_core::{
    load_trust_config, prepare_signing_payload, sign_document, CrlFetcher, HttpCrlFetcher,
    LocalRsaSigner, PrescriptionDocument, RevocationPolicy, SignatureVerifier, SigningAlgorithm,
    StaticCrlFetcher,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "eps")]
#[command(about = "Prescription signing and signature verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the signing payload of a prescription as JSON
    Digest {
        /// ParentPrescription XML file
        file: PathBuf,
        /// Signing algorithm (RS1 or RS256)
        #[arg(long, default_value = "RS1")]
        algorithm: SigningAlgorithm,
    },
    /// Sign a prescription with a local development key
    Sign {
        /// ParentPrescription XML file
        file: PathBuf,
        /// PKCS#8 PEM private key
        #[arg(long)]
        key: PathBuf,
        /// PEM certificate of the key
        #[arg(long)]
        cert: PathBuf,
        /// Signing algorithm (RS1 or RS256)
        #[arg(long, default_value = "RS1")]
        algorithm: SigningAlgorithm,
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify the signature embedded in a prescription
    Verify {
        /// Signed ParentPrescription XML file
        file: PathBuf,
        /// PEM bundle of trusted issuer certificates
        #[arg(long)]
        trusted: PathBuf,
        /// Serve a CRL from disk instead of downloading it (URI=FILE, repeatable)
        #[arg(long = "crl", value_parser = parse_crl_override)]
        crls: Vec<(String, PathBuf)>,
        /// Accept certificates whose revocation status cannot be determined
        #[arg(long)]
        allow_unknown_revocation: bool,
        /// CRL download timeout in seconds
        #[arg(long, default_value_t = 10)]
        crl_timeout_secs: u64,
    },
    /// Generate a development CA, prescriber certificate and empty CRL
    GeneratePki {
        /// Output directory
        dir: PathBuf,
        /// CRL distribution point written into the prescriber certificate
        #[arg(long, default_value = "http://localhost:8080/eps.crl")]
        crl_uri: String,
    },
}

fn parse_crl_override(value: &str) -> Result<(String, PathBuf), String> {
    match value.rsplit_once('=') {
        Some((uri, file)) if !uri.is_empty() && !file.is_empty() => {
            Ok((uri.to_owned(), PathBuf::from(file)))
        }
        _ => Err(format!("expected URI=FILE, got '{value}'")),
    }
}

fn read_document(path: &Path) -> anyhow::Result<PrescriptionDocument> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    PrescriptionDocument::parse(&xml).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("eps=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Digest { file, algorithm } => {
            let document = read_document(&file)?;
            let payload = prepare_signing_payload(&document, algorithm)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Sign {
            file,
            key,
            cert,
            algorithm,
            out,
        } => {
            let mut document = read_document(&file)?;
            let key_pem = std::fs::read_to_string(&key)
                .with_context(|| format!("reading {}", key.display()))?;
            let cert_pem = std::fs::read_to_string(&cert)
                .with_context(|| format!("reading {}", cert.display()))?;
            let signer = LocalRsaSigner::from_pem(&key_pem, &cert_pem)?;

            sign_document(&mut document, algorithm, &signer)?;
            let xml = document.to_xml();
            match out {
                Some(out) => {
                    std::fs::write(&out, xml)
                        .with_context(|| format!("writing {}", out.display()))?;
                    println!("Signed prescription written to {}", out.display());
                }
                None => println!("{xml}"),
            }
        }
        Commands::Verify {
            file,
            trusted,
            crls,
            allow_unknown_revocation,
            crl_timeout_secs,
        } => {
            let document = read_document(&file)?;
            let config = load_trust_config(&trusted)?
                .with_revocation_policy(RevocationPolicy {
                    unknown_is_failure: !allow_unknown_revocation,
                })
                .with_crl_fetch_timeout(Duration::from_secs(crl_timeout_secs));

            let fetcher: Arc<dyn CrlFetcher> = if crls.is_empty() {
                Arc::new(HttpCrlFetcher::new(config.crl_fetch_timeout())?)
            } else {
                let mut fetcher = StaticCrlFetcher::new();
                for (uri, path) in crls {
                    let der = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    fetcher.insert(uri, der);
                }
                Arc::new(fetcher)
            };

            let report = SignatureVerifier::new(&config, fetcher)
                .verify(&document)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::GeneratePki { dir, crl_uri } => {
            let pki = DevelopmentPki::generate(&crl_uri)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;

            let ca_pem = pki.authority.cert_pem();
            let files: [(&str, &[u8]); 5] = [
                ("ca.pem", ca_pem.as_bytes()),
                ("ca-key.pem", pki.authority.key_pem().as_bytes()),
                ("prescriber.pem", pki.prescriber.cert_pem.as_bytes()),
                ("prescriber-key.pem", pki.prescriber.key_pem.as_bytes()),
                ("eps.crl", &pki.revocation_list_der),
            ];
            for (name, contents) in files {
                let path = dir.join(name);
                std::fs::write(&path, contents)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            println!("Development PKI written to {}", dir.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
