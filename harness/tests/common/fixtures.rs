//! Fake applications for harness tests
//!
//! Each fixture is an `sh -c` script that speaks the same line protocol as
//! the real server and clients: banner lines at startup, timestamped log
//! records afterwards, one line per command on stdin.

use harness::LaunchSpec;

pub struct TestFixtures;

impl TestFixtures {
    pub const PORT: u16 = 4555;

    /// Prints a banner and a ready line, then acknowledges every command
    pub const WELL_BEHAVED: &'static str = r#"
echo "Erlang/OTP 26 [erts-14.2] [64-bit]"
echo "Interactive Elixir (1.15.7) - press Ctrl+C to exit"
echo "12:00:00.000 [notice] listening on port $PORT"
while IFS= read -r line; do
  echo "12:00:00.001 [info] ack: $line"
done
"#;

    /// Like `WELL_BEHAVED` but every message send is reported as failed
    pub const FAILING_SENDS: &'static str = r#"
echo "12:00:00.000 [notice] listening on port $PORT"
while IFS= read -r line; do
  case "$line" in
    *Message.send*) echo "12:00:00.002 [error] delivery failed: $line" ;;
    *) echo "12:00:00.001 [info] ack: $line" ;;
  esac
done
"#;

    /// Writes `LINES_PER_CLIENT` records after its first command, then idles
    /// until its input closes
    pub const CHATTY: &'static str = r#"
IFS= read -r first
i=0
while [ $i -lt 200 ]; do
  echo "12:00:00.000 [info] line $i"
  i=$((i+1))
done
cat > /dev/null
"#;

    pub const LINES_PER_CLIENT: usize = 200;

    /// Exits after its first command
    pub const ONE_SHOT: &'static str = r#"
echo "12:00:00.000 [notice] listening on port $PORT"
IFS= read -r line
echo "12:00:00.001 [info] ack: $line"
exit 0
"#;

    /// Ignores SIGTERM and never reads its input
    pub const STUBBORN: &'static str = r#"
trap '' TERM
echo "12:00:00.000 [notice] listening on port $PORT"
while true; do sleep 1; done
"#;

    pub fn script(body: &str) -> LaunchSpec {
        LaunchSpec::new("sh").args(["-c", body])
    }

    pub fn well_behaved() -> LaunchSpec {
        Self::script(Self::WELL_BEHAVED)
    }

    pub fn missing_binary() -> LaunchSpec {
        LaunchSpec::new("definitely_not_a_real_binary_4555")
    }
}
