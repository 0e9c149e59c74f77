use super::environment::Environment;
use super::ports::CertificateTarget;
use super::step::ApiStep;
use super::template::TemplateKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub id: String,
    pub name: String,
}

/// The (user, profile, bank, environment) tuple a flow runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSession {
    pub user_id: String,
    pub profile_id: String,
    pub bank: Bank,
    pub environment: Environment,
}

impl FlowSession {
    pub fn key(&self, step: ApiStep) -> TemplateKey {
        TemplateKey {
            user_id: self.user_id.clone(),
            profile_id: self.profile_id.clone(),
            bank_id: self.bank.id.clone(),
            environment: self.environment,
            step,
        }
    }

    pub fn certificate_target(&self) -> CertificateTarget {
        CertificateTarget {
            bank_name: self.bank.name.clone(),
            environment: self.environment,
        }
    }
}
