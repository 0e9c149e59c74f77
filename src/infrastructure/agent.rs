use crate::domain::ports::ExternalAgent;
use crate::error::Result;
use std::io::Write;
use std::sync::Mutex;

/// Shows the SCA redirect by writing it out, for the user to open in a
/// browser or on a phone.
pub struct ConsoleAgent<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleAgent<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> ExternalAgent for ConsoleAgent<W> {
    fn open(&self, url: &str) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "Open this link to authorize the consent:")?;
        writeln!(out, "{url}")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_agent_prints_link() {
        let agent = ConsoleAgent::new(Vec::new());
        agent.open("https://bank.test/sca?id=1").unwrap();
        let text = String::from_utf8(agent.into_inner()).unwrap();
        assert!(text.contains("https://bank.test/sca?id=1"));
    }
}
