#[cfg(unix)]
mod relay_pumps {
    use std::fs::{self, File};
    use std::io::{self, Write};
    use std::os::fd::AsFd;
    use std::thread;
    use std::time::Duration;

    use ptyscribe::fd::{pipe, NonBlocking};
    use ptyscribe::relay::{pump, run_output_pump, PumpEnd, RelayError, Sink, Transcript};

    /// Accepts only half of every write.
    struct HalfWriter;

    impl Write for HalfWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len() / 2)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records the size of every write it receives.
    #[derive(Default)]
    struct ChunkRecorder {
        chunks: Vec<usize>,
        data: Vec<u8>,
    }

    impl Write for ChunkRecorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.chunks.push(buf.len());
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails the first write with EINTR, then behaves.
    #[derive(Default)]
    struct InterruptedOnce {
        interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn source_with(bytes: &[u8]) -> File {
        let (rx, mut tx) = pipe().unwrap();
        tx.write_all(bytes).unwrap();
        rx
    }

    #[test]
    fn bytes_reach_every_sink_in_order() {
        let (stop, _stop_tx) = pipe().unwrap();
        let mut first = Vec::new();
        let mut second = Vec::new();
        let source = source_with(b"first chunk, second chunk");

        let stats = {
            let mut sinks = [Sink::new("first", &mut first), Sink::new("second", &mut second)];
            pump("test", &source, &mut sinks, 256, stop.as_fd()).unwrap()
        };

        assert_eq!(stats.end, PumpEnd::EndOfStream);
        assert_eq!(stats.bytes, 25);
        assert_eq!(first, b"first chunk, second chunk");
        assert_eq!(second, first);
    }

    #[test]
    fn reads_never_exceed_the_chunk_size() {
        let (stop, _stop_tx) = pipe().unwrap();
        let mut recorder = ChunkRecorder::default();
        let source = source_with(b"0123456789");

        {
            let mut sinks = [Sink::new("recorder", &mut recorder)];
            pump("test", &source, &mut sinks, 4, stop.as_fd()).unwrap();
        }

        assert!(recorder.chunks.iter().all(|&len| len <= 4));
        assert_eq!(recorder.data, b"0123456789");
    }

    #[test]
    fn idle_pump_stops_when_woken() {
        let (stop, mut stop_tx) = pipe().unwrap();
        let (source, _source_tx) = pipe().unwrap();
        let mut sink = Vec::new();
        stop_tx.write_all(&[1]).unwrap();

        let stats = {
            let mut sinks = [Sink::new("sink", &mut sink)];
            pump("test", &source, &mut sinks, 256, stop.as_fd()).unwrap()
        };

        assert_eq!(stats.end, PumpEnd::Cancelled);
        assert_eq!(stats.bytes, 0);
    }

    #[test]
    fn wake_takes_priority_over_pending_input() {
        let (stop, mut stop_tx) = pipe().unwrap();
        let source = source_with(b"never relayed");
        let mut sink = Vec::new();
        stop_tx.write_all(&[1]).unwrap();

        let stats = {
            let mut sinks = [Sink::new("sink", &mut sink)];
            pump("test", &source, &mut sinks, 256, stop.as_fd()).unwrap()
        };

        assert_eq!(stats.end, PumpEnd::Cancelled);
        assert!(sink.is_empty());
    }

    #[test]
    fn pump_stuck_on_a_full_destination_stops_when_woken() {
        let (stop, mut stop_tx) = pipe().unwrap();
        let source = source_with(b"does not fit");
        let (_full_rx, full_tx) = pipe().unwrap();
        let _nonblocking = NonBlocking::enable(full_tx.as_fd()).unwrap();
        let mut filler = &full_tx;
        while filler.write(&[0u8; 4096]).is_ok() {}
        while filler.write(&[0u8; 1]).is_ok() {}

        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stop_tx.write_all(&[1]).unwrap();
        });

        let mut writer = &full_tx;
        let stats = {
            let mut sinks = [Sink::with_fd("full pipe", &mut writer, full_tx.as_fd())];
            pump("test", &source, &mut sinks, 256, stop.as_fd()).unwrap()
        };
        waker.join().unwrap();

        assert_eq!(stats.end, PumpEnd::Cancelled);
        assert_eq!(stats.bytes, 0);
    }

    #[test]
    fn short_write_is_an_error() {
        let (stop, _stop_tx) = pipe().unwrap();
        let source = source_with(b"12345678");
        let mut half = HalfWriter;

        let mut sinks = [Sink::new("half", &mut half)];
        let err = pump("test", &source, &mut sinks, 256, stop.as_fd()).unwrap_err();
        match err {
            RelayError::ShortWrite {
                target,
                expected,
                written,
            } => {
                assert_eq!(target, "half");
                assert_eq!(expected, 8);
                assert_eq!(written, 4);
            }
            other => panic!("expected short write, got {other:?}"),
        }
    }

    #[test]
    fn interrupted_write_is_retried() {
        let (stop, _stop_tx) = pipe().unwrap();
        let source = source_with(b"retry me");
        let mut sink = InterruptedOnce::default();

        {
            let mut sinks = [Sink::new("flaky", &mut sink)];
            pump("test", &source, &mut sinks, 256, stop.as_fd()).unwrap();
        }
        assert_eq!(sink.data, b"retry me");
    }

    #[test]
    fn output_pump_mirrors_terminal_into_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let (stop, _stop_tx) = pipe().unwrap();
        let master = source_with(b"$ ls\r\nfile\r\n");
        let output = File::create(dir.path().join("terminal")).unwrap();
        let mut transcript = Transcript::create(dir.path().join("typescript")).unwrap();

        let stats = run_output_pump(&master, &output, &mut transcript, 3, stop.as_fd()).unwrap();
        assert_eq!(stats.bytes, 12);
        assert_eq!(transcript.close().unwrap(), 12);

        let shown = fs::read(dir.path().join("terminal")).unwrap();
        let recorded = fs::read(dir.path().join("typescript")).unwrap();
        assert_eq!(shown, b"$ ls\r\nfile\r\n");
        assert_eq!(recorded, shown);
    }
}
