use equipow::{
    derive_challenge, EquihashServiceBuilder, Minter, MinterConfigBuilder, PowRegistry,
    PowService, PowVersion,
};
use hex::encode as hex_encode;
use std::sync::Arc;
use std::time::Duration;

fn usage() -> String {
    "Usage: cargo run --release --example equihash_demo -- [--payload <str>] [--item <str>] [--owner <str>] [--difficulty <f64>] [--n <u32>] [--k <u32>] [--timeout-ms <u64>]\n\
     Defaults: --payload \"hello\" --item \"item\" --owner \"owner\" --difficulty 1 --n 90 --k 5\n"
        .to_string()
}

fn parse_next<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>) -> Result<T, String> {
    args.next()
        .ok_or_else(usage)?
        .parse()
        .map_err(|_| usage())
}

fn main() -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    let mut payload = String::from("hello");
    let mut item = String::from("item");
    let mut owner = String::from("owner");
    let mut difficulty: f64 = 1.0;
    let mut n: u32 = 90;
    let mut k: u32 = 5;
    let mut timeout_ms: Option<u64> = None;
    while let Some(a) = args.next() {
        match a.as_str() {
            "--payload" => payload = args.next().ok_or_else(usage)?,
            "--item" => item = args.next().ok_or_else(usage)?,
            "--owner" => owner = args.next().ok_or_else(usage)?,
            "--difficulty" => difficulty = parse_next(&mut args)?,
            "--n" => n = parse_next(&mut args)?,
            "--k" => k = parse_next(&mut args)?,
            "--timeout-ms" => timeout_ms = Some(parse_next(&mut args)?),
            _ => return Err(usage()),
        }
    }

    let service = EquihashServiceBuilder::default()
        .n(n)
        .k(k)
        .build_validated()
        .map_err(|e| e.to_string())?;
    println!(
        "equihash n={n} k={k} difficulty={difficulty} scaled={}",
        service.scaled_difficulty(difficulty)
    );

    let mut registry = PowRegistry::standard();
    registry.register(Arc::new(service));
    let config = MinterConfigBuilder::default()
        .mint_timeout(timeout_ms.map(Duration::from_millis))
        .build_validated()
        .map_err(|e| e.to_string())?;
    let minter = Minter::spawn(Arc::new(registry), config).map_err(|e| e.to_string())?;

    let challenge = derive_challenge(&item, &owner).map_err(|e| e.to_string())?;
    let pow = minter
        .mint(PowVersion::Equihash, payload.as_bytes(), &challenge, difficulty)
        .map_err(|e| e.to_string())?
        .wait()
        .map_err(|e| e.to_string())?;

    println!(
        "counter={}, time_ms={}, solution_hex={}",
        pow.counter,
        pow.duration_ms,
        hex_encode(&pow.solution)
    );
    println!("{}", pow.to_json().map_err(|e| e.to_string())?);

    let service = minter
        .registry()
        .get(PowVersion::Equihash)
        .map_err(|e| e.to_string())?;
    assert!(service.verify_with_control(&pow, &item, &owner, difficulty));
    println!("verify=ok");
    minter.shutdown();
    Ok(())
}
