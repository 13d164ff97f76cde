use dkimcheck::{CanonicalStr, Config, RawMessage, Verifier};
use hickory_resolver::Resolver;
use std::{
    env,
    io::{self, Read},
    process,
};

fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut args = env::args();

    let fail_if_expired = match (args.next().as_deref(), args.next().as_deref()) {
        (_, None) => false,
        (_, Some("--fail-if-expired")) => true,
        (program, _) => {
            eprintln!("usage: {} [--fail-if-expired]", program.unwrap_or("dkimverify"));
            process::exit(1);
        }
    };

    let mut msg = Vec::new();
    io::stdin().read_to_end(&mut msg).unwrap();

    let msg = match RawMessage::new(msg) {
        Ok(msg) => msg,
        Err(e) => {
            eprintln!("dkimverify: {e}");
            process::exit(1);
        }
    };

    let resolver = Resolver::from_system_conf().unwrap();

    let config = Config {
        fail_if_expired,
        ..Default::default()
    };

    let verifier = Verifier::with_config(resolver, config);

    let results = verifier.validate(&msg).unwrap();

    if results.is_empty() {
        println!("no DKIM signatures");
    }

    for (i, entries) in results {
        println!();
        println!("SIGNATURE {}", i + 1);
        for entry in entries {
            println!("{}\t{}", entry.status.canonical_str(), entry.reason());
        }
    }
}
