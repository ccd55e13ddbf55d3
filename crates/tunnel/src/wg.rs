//! [`TunnelController`] backed by the `wg` and `wg-quick` tools.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};
use wayfare_primitives::TunnelKey;

use crate::{
    CommandOutput, CommandRunner, InterfaceDump, ProcessRunner, TunnelArgs, TunnelController,
    TunnelError,
};

const WG: &str = "wg";
const WG_QUICK: &str = "wg-quick";

/// Drives a WireGuard interface through its command line tools.
#[derive(Debug, Clone)]
pub struct WgController<R = ProcessRunner> {
    runner: R,
    interface: String,
    keepalive: u16,
    timeout: Duration,
    sudo: bool,
}

impl WgController<ProcessRunner> {
    /// Controller spawning real processes.
    pub fn from_args(args: &TunnelArgs) -> Self {
        Self::with_runner(ProcessRunner, args)
    }
}

impl<R: CommandRunner> WgController<R> {
    pub fn with_runner(runner: R, args: &TunnelArgs) -> Self {
        Self {
            runner,
            interface: args.interface.clone(),
            keepalive: args.keepalive,
            timeout: args.command_timeout(),
            sudo: args.sudo,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Run a command bounded by the configured timeout, without judging its exit status.
    async fn exec(&self, program: &str, args: &[&str]) -> Result<(String, CommandOutput), TunnelError> {
        let (program, argv) = self.argv(program, args);
        let command = render(&program, &argv);
        trace!(%command, "Running tunnel command");

        match tokio::time::timeout(self.timeout, self.runner.run(&program, &argv)).await {
            Ok(Ok(output)) => Ok((command, output)),
            Ok(Err(source)) => Err(TunnelError::Spawn { command, source }),
            Err(_) => Err(TunnelError::Timeout {
                command,
                timeout: self.timeout,
            }),
        }
    }

    /// Run a command and require it to succeed.
    async fn exec_ok(&self, program: &str, args: &[&str]) -> Result<String, TunnelError> {
        let (command, output) = self.exec(program, args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(TunnelError::Interface {
                command,
                reason: output.stderr.trim().to_string(),
            })
        }
    }

    /// Whether `wg show <iface>` finds the interface.
    async fn is_up(&self) -> Result<bool, TunnelError> {
        let (_, output) = self.exec(WG, &["show", &self.interface]).await?;
        Ok(output.success)
    }

    fn argv(&self, program: &str, args: &[&str]) -> (String, Vec<String>) {
        let args = args.iter().map(|arg| arg.to_string());
        if self.sudo {
            ("sudo".to_string(), std::iter::once(program.to_string()).chain(args).collect())
        } else {
            (program.to_string(), args.collect())
        }
    }
}

#[async_trait]
impl<R: CommandRunner> TunnelController for WgController<R> {
    async fn bring_up(&self) -> Result<(), TunnelError> {
        if self.is_up().await? {
            warn!(interface = %self.interface, "Interface already up");
            return Ok(());
        }
        self.exec_ok(WG_QUICK, &["up", &self.interface]).await?;
        debug!(interface = %self.interface, "Interface up");
        Ok(())
    }

    async fn tear_down(&self) -> Result<(), TunnelError> {
        if !self.is_up().await? {
            warn!(interface = %self.interface, "Interface already down");
            return Ok(());
        }
        self.exec_ok(WG_QUICK, &["down", &self.interface]).await?;
        debug!(interface = %self.interface, "Interface down");
        Ok(())
    }

    async fn apply_peer(&self, key: &TunnelKey, address: Ipv4Addr) -> Result<(), TunnelError> {
        let key_arg = key.to_base64();
        let allowed = format!("{address}/32");
        let keepalive = self.keepalive.to_string();
        self.exec_ok(
            WG,
            &[
                "set",
                &self.interface,
                "peer",
                &key_arg,
                "allowed-ips",
                &allowed,
                "persistent-keepalive",
                &keepalive,
            ],
        )
        .await?;
        debug!(peer = %key.short(), %address, "Peer applied");
        Ok(())
    }

    async fn remove_peer(&self, key: &TunnelKey) -> Result<(), TunnelError> {
        let key_arg = key.to_base64();
        let (command, output) = self
            .exec(WG, &["set", &self.interface, "peer", &key_arg, "remove"])
            .await?;
        if output.success {
            debug!(peer = %key.short(), "Peer removed");
            return Ok(());
        }

        // A peer cannot be present on an interface that does not exist.
        if !self.is_up().await? {
            debug!(peer = %key.short(), interface = %self.interface, "Interface down, peer already absent");
            return Ok(());
        }

        Err(TunnelError::Interface {
            command,
            reason: output.stderr.trim().to_string(),
        })
    }

    async fn dump(&self) -> Result<InterfaceDump, TunnelError> {
        let (_, output) = self.exec(WG, &["show", &self.interface, "dump"]).await?;
        if !output.success {
            return Err(TunnelError::InterfaceUnavailable {
                interface: self.interface.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }

        let dump = InterfaceDump::parse(&output.stdout);
        for error in &dump.errors {
            warn!(interface = %self.interface, %error, "Skipping unparsable dump line");
        }
        Ok(dump)
    }

    async fn interface_public_key(&self) -> Result<TunnelKey, TunnelError> {
        let (command, output) = self.exec(WG, &["show", &self.interface, "public-key"]).await?;
        if !output.success {
            return Err(TunnelError::InterfaceUnavailable {
                interface: self.interface.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }
        output.stdout.trim().parse().map_err(|e: wayfare_primitives::TunnelKeyError| {
            TunnelError::Output {
                command,
                reason: e.to_string(),
            }
        })
    }
}

fn render(program: &str, args: &[String]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io;

    const KEY: &str = "ApTKDmBmi4TwR396iqKQuqK+W2StD6hIyWqCBV1/MBU=";

    /// Replays scripted outputs in order and records every invocation.
    #[derive(Default)]
    struct ScriptedRunner {
        script: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<String>>,
        hang: bool,
    }

    impl ScriptedRunner {
        fn new(script: impl IntoIterator<Item = CommandOutput>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            self.calls.lock().push(render(program, args));
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.script
                .lock()
                .pop_front()
                .ok_or_else(|| io::Error::other("script exhausted"))
        }
    }

    fn controller(runner: &ScriptedRunner) -> WgController<&ScriptedRunner> {
        WgController::with_runner(runner, &TunnelArgs::default())
    }

    #[tokio::test]
    async fn test_apply_peer_command() {
        let runner = ScriptedRunner::new([CommandOutput::ok("")]);
        let key: TunnelKey = KEY.parse().unwrap();

        controller(&runner)
            .apply_peer(&key, Ipv4Addr::new(10, 0, 0, 2))
            .await
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![format!(
                "wg set wg0 peer {KEY} allowed-ips 10.0.0.2/32 persistent-keepalive 25"
            )]
        );
    }

    #[tokio::test]
    async fn test_sudo_prefix() {
        let runner = ScriptedRunner::new([CommandOutput::ok("")]);
        let args = TunnelArgs {
            sudo: true,
            ..Default::default()
        };
        let key: TunnelKey = KEY.parse().unwrap();

        WgController::with_runner(&runner, &args).remove_peer(&key).await.unwrap();

        assert_eq!(runner.calls(), vec![format!("sudo wg set wg0 peer {KEY} remove")]);
    }

    #[tokio::test]
    async fn test_apply_failure_surfaces_stderr() {
        let runner = ScriptedRunner::new([CommandOutput::failed("Unable to modify interface\n")]);
        let key: TunnelKey = KEY.parse().unwrap();

        let err = controller(&runner)
            .apply_peer(&key, Ipv4Addr::new(10, 0, 0, 2))
            .await
            .unwrap_err();
        assert_matches!(err, TunnelError::Interface { reason, .. } if reason == "Unable to modify interface");
    }

    #[tokio::test]
    async fn test_remove_on_downed_interface_is_ok() {
        let runner = ScriptedRunner::new([
            CommandOutput::failed("No such device"),
            CommandOutput::failed("No such device"),
        ]);
        let key: TunnelKey = KEY.parse().unwrap();

        controller(&runner).remove_peer(&key).await.unwrap();
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_failure_on_live_interface() {
        let runner = ScriptedRunner::new([
            CommandOutput::failed("Operation not permitted"),
            CommandOutput::ok("interface: wg0"),
        ]);
        let key: TunnelKey = KEY.parse().unwrap();

        let err = controller(&runner).remove_peer(&key).await.unwrap_err();
        assert_matches!(err, TunnelError::Interface { .. });
    }

    #[tokio::test]
    async fn test_bring_up_when_already_up() {
        let runner = ScriptedRunner::new([CommandOutput::ok("interface: wg0")]);
        controller(&runner).bring_up().await.unwrap();
        assert_eq!(runner.calls(), vec!["wg show wg0".to_string()]);
    }

    #[tokio::test]
    async fn test_bring_up_runs_wg_quick() {
        let runner = ScriptedRunner::new([
            CommandOutput::failed("No such device"),
            CommandOutput::ok(""),
        ]);
        controller(&runner).bring_up().await.unwrap();
        assert_eq!(runner.calls(), vec!["wg show wg0".to_string(), "wg-quick up wg0".to_string()]);
    }

    #[tokio::test]
    async fn test_tear_down_when_already_down() {
        let runner = ScriptedRunner::new([CommandOutput::failed("No such device")]);
        controller(&runner).tear_down().await.unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dump_parses_counters() {
        let output = format!(
            "priv\tpub\t51820\toff\n{KEY}\t(none)\t(none)\t10.0.0.2/32\t0\t1000\t500\t25\n"
        );
        let runner = ScriptedRunner::new([CommandOutput::ok(output)]);
        let key: TunnelKey = KEY.parse().unwrap();

        let dump = controller(&runner).dump().await.unwrap();
        assert_eq!(dump.counters(&key).map(|c| c.total()), Some(1500));
    }

    #[tokio::test]
    async fn test_dump_on_downed_interface() {
        let runner = ScriptedRunner::new([CommandOutput::failed("No such device")]);
        let err = controller(&runner).dump().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_interface_public_key() {
        let runner = ScriptedRunner::new([CommandOutput::ok(format!("{KEY}\n"))]);
        let key = controller(&runner).interface_public_key().await.unwrap();
        assert_eq!(key.to_base64(), KEY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout() {
        let runner = ScriptedRunner {
            hang: true,
            ..Default::default()
        };
        let err = controller(&runner).dump().await.unwrap_err();
        assert_matches!(err, TunnelError::Timeout { .. });
    }
}
