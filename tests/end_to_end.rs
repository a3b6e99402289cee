use std::{
    fs,
    net::{SocketAddr, TcpStream},
    path::Path,
    process::Command,
    thread::sleep,
    time::Duration,
};

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};

const GAME_FORM: [&str; 6] = [
    "--category",
    "Game Development",
    "--niche",
    "Singleplayer",
    "--industry",
    "PC",
];

fn cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.arg("--dir").arg(dir);
    cmd
}

fn stdout(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn catalog() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout(cmd(dir.path()).arg("catalog"));
    let catalog: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(catalog.as_array().unwrap().len(), 5);

    let out = stdout(cmd(dir.path()).args(["catalog", "-c", "Copywriting"]));
    let category: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(category["name"], "Copywriting");

    cmd(dir.path())
        .args(["catalog", "-c", "Knitting"])
        .assert()
        .failure();
}

#[test]
fn offline_generate_spends_tokens_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    setup_conf(dir, 7310);

    let out = stdout(
        cmd(dir)
            .arg("generate")
            .args(GAME_FORM)
            .args(["-k", "Easy", "--deadline", "2", "--unit", "weeks"])
            .args(["-e", "txt", "-e", "pdf"]),
    );
    assert!(out.starts_with("NikharaBrief\nBrief ID: BRF"), "{out}");
    assert!(out.contains("Company Name : Quantum Weavers"), "{out}");
    assert!(out.contains("Deadline : 2 weeks"), "{out}");

    let exported: Vec<String> = out
        .lines()
        .filter(|l| l.starts_with("brief-"))
        .map(String::from)
        .collect();
    assert_eq!(exported.len(), 2, "{out}");
    for name in &exported {
        assert!(dir.join(name).is_file(), "{name}");
    }
    let pdf = fs::read(dir.join(&exported[1])).unwrap();
    assert!(pdf.starts_with(b"%PDF-1.4"));

    // Same device, same day.
    let out = stdout(cmd(dir).arg("tokens"));
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["tokensRemaining"], 20);
    assert!(dir.join("device_id").is_file());

    cmd(dir)
        .arg("generate")
        .args(["--category", "Copywriting", "--niche", "", "--industry", "Food"])
        .assert()
        .failure();
    let out = stdout(cmd(dir).arg("tokens"));
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["tokensRemaining"], 20);
}

#[test]
fn user_history_and_profile() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    setup_conf(dir, 7311);

    let out = stdout(cmd(dir).arg("generate").args(GAME_FORM).args(["-u", "u1"]));
    let id = out
        .lines()
        .find_map(|l| l.strip_prefix("Brief ID: "))
        .unwrap()
        .to_string();

    let out = stdout(cmd(dir).args(["history", "-u", "u1"]));
    assert!(out.starts_with(&id), "{out}");
    assert!(out.contains("Quantum Weavers"), "{out}");

    let out = stdout(cmd(dir).args(["export", &id, "md"]));
    assert_eq!(out.trim(), format!("brief-{id}.md"));

    let out = stdout(cmd(dir).args(["profile", "u1", "--payment", "paid"]));
    let user: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(user["payment"], "paid");
    // Today's row was created as unpaid, before the upgrade.
    assert_eq!(user["tokens"], 20);
}

#[test]
fn bad_conf_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let mut conf = briefsmith::conf::Conf::default();
    conf.generator.timeout = -3.0;
    fs::create_dir_all(dir.join("conf")).unwrap();
    fs::write(dir.join("conf/conf.toml"), toml::to_string(&conf).unwrap())
        .unwrap();

    let output = cmd(dir).arg("tokens").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Invalid generator.timeout"), "{stderr}");
}

#[tokio::test]
async fn server() {
    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let port = 7312;
    setup_conf(dir, port);

    let sock_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    assert!(server_is_not_listening(&sock_addr));
    let mut server = cmd(dir).arg("server").spawn().unwrap();
    assert!(server_is_listening(&sock_addr));

    let client = reqwest::Client::new();
    let base = format!("http://{sock_addr}");
    let health = async {
        let resp = client.get(format!("{base}/health")).send().await?;
        resp.text().await
    }
    .await;
    let tokens = async {
        let resp = client
            .get(format!("{base}/tokens"))
            .header("X-Device-Id", "device_1700000000000_abcdefghi")
            .send()
            .await?;
        resp.json::<serde_json::Value>().await
    }
    .await;
    let anonymous = client.get(format!("{base}/tokens")).send().await;

    // XXX Stop the server BEFORE asserting, because if any assert fails
    //     we will not get a chance to clean-up.
    server.kill().unwrap();

    assert_eq!(health.unwrap(), "OK");
    assert_eq!(tokens.unwrap()["tokensRemaining"], 30);
    assert_eq!(anonymous.unwrap().status(), reqwest::StatusCode::UNAUTHORIZED);
}

fn setup_conf(workdir: &Path, port: u16) -> briefsmith::conf::Conf {
    let mut conf = briefsmith::conf::Conf {
        port,
        ..Default::default()
    };
    conf.generator.offline_delay = 0.0;
    let conf_str = toml::to_string(&conf).unwrap();
    let conf_dir = workdir.join("conf");
    fs::create_dir_all(&conf_dir).unwrap();
    fs::write(conf_dir.join("conf.toml"), &conf_str).unwrap();
    conf
}

fn server_is_not_listening(addr: &SocketAddr) -> bool {
    TcpStream::connect(addr).is_err()
}

fn server_is_listening(addr: &SocketAddr) -> bool {
    let interval = Duration::from_secs_f32(0.25);
    let attempts = 20;
    retry_until_true(|| TcpStream::connect(addr).is_ok(), interval, attempts)
}

fn retry_until_true<F: Fn() -> bool>(
    f: F,
    interval: Duration,
    mut attempts: usize,
) -> bool {
    while attempts > 0 {
        if f() {
            return true;
        } else {
            attempts -= 1;
            sleep(interval);
        }
    }
    false
}
