#[cfg(unix)]
mod common;

// Kept apart from the other session tests: a termination signal raised here
// reaches every watcher in the process.
#[cfg(unix)]
mod session_signals {
    use std::thread;

    use ptyscribe::lifecycle;
    use ptyscribe::shutdown::EndReason;

    use crate::common::{
        exec_lock, process_exists, read_pid, read_until, script, session_options, PtyPair,
    };

    #[test]
    fn sigterm_ends_the_session_and_restores_the_terminal() {
        let _exec = exec_lock();
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let shell = script(
            dir.path(),
            "sleepy.sh",
            &format!("echo $$ > '{}'\nprintf ready\nexec sleep 30", pid_file.display()),
        );
        let transcript = dir.path().join("output");

        let pair = PtyPair::open();
        let before = pair.slave_mode();
        let outer = pair.outer();

        let master = pair.master.try_clone().unwrap();
        let sender = thread::spawn(move || {
            read_until(&master, b"ready");
            unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        });

        let outcome = lifecycle::run(&outer, &session_options(shell, &transcript)).unwrap();
        sender.join().unwrap();

        assert_eq!(outcome.reason, EndReason::Terminated(libc::SIGTERM));
        assert_eq!(outcome.exit_code(), 143);
        let pid = read_pid(&pid_file);
        assert!(!process_exists(pid), "shell {pid} was left behind");
        assert_eq!(pair.slave_mode(), before);
    }
}
