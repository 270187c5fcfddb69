//! View model for the admin credits tool.
//!
//! Everything here is a pure function of ledger state; services never decide
//! what is shown.
use serde::Serialize;
use uuid::Uuid;

use super::{
    credits::{CreditOperation, CreditScope},
    owner::OrganizationContext,
};

pub const USER_CREDITS_ADD_FORM_ID: &str = "user_credits_add";
pub const USER_CREDITS_REMOVE_FORM_ID: &str = "user_credits_remove";
pub const ORG_CREDITS_ADD_FORM_ID: &str = "org_credits_add";
pub const ORG_CREDITS_REMOVE_FORM_ID: &str = "org_credits_remove";

const AVAILABLE_USER_CREDIT: &str = "available user credit";

/// Stable per-user endpoint every credits form submits to
pub fn credits_action_path(user_id: Uuid) -> String {
    format!("/admin/users/{}/tools/credits", user_id)
}

/// English singular/plural selection: only a count of exactly one is singular
pub fn pluralize(count: i64, singular: &str) -> String {
    if count == 1 {
        singular.to_string()
    } else {
        format!("{}s", singular)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreditsForm {
    pub id: &'static str,
    pub title: &'static str,
    pub action: String,
    pub method: &'static str,
    pub scope: CreditScope,
    pub operation: CreditOperation,
}

impl CreditsForm {
    fn new(
        id: &'static str,
        title: &'static str,
        user_id: Uuid,
        scope: CreditScope,
        operation: CreditOperation,
    ) -> Self {
        Self {
            id,
            title,
            action: credits_action_path(user_id),
            method: "post",
            scope,
            operation,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCreditsSection {
    pub organization_id: Uuid,
    pub add: CreditsForm,
    pub remove: CreditsForm,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreditsPanel {
    pub user_id: Uuid,
    pub unspent_credits: i64,
    pub available_label: String,
    pub add_credits: CreditsForm,
    pub remove_credits: Option<CreditsForm>,
    pub organization_credits: Option<OrganizationCreditsSection>,
}

impl CreditsPanel {
    pub fn build(user_id: Uuid, unspent_credits: i64, organization: OrganizationContext) -> Self {
        let available_label = format!(
            "{} {}",
            unspent_credits,
            pluralize(unspent_credits, AVAILABLE_USER_CREDIT)
        );

        let add_credits = CreditsForm::new(
            USER_CREDITS_ADD_FORM_ID,
            "Add credits",
            user_id,
            CreditScope::User,
            CreditOperation::Add,
        );

        let remove_credits = (unspent_credits > 0).then(|| {
            CreditsForm::new(
                USER_CREDITS_REMOVE_FORM_ID,
                "Remove credits",
                user_id,
                CreditScope::User,
                CreditOperation::Remove,
            )
        });

        let organization_credits = match organization {
            OrganizationContext::NoOrganization => None,
            OrganizationContext::HasOrganization(organization_id) => {
                Some(OrganizationCreditsSection {
                    organization_id,
                    add: CreditsForm::new(
                        ORG_CREDITS_ADD_FORM_ID,
                        "Add credits to organizations",
                        user_id,
                        CreditScope::Organization,
                        CreditOperation::Add,
                    ),
                    remove: CreditsForm::new(
                        ORG_CREDITS_REMOVE_FORM_ID,
                        "Remove credits from organizations",
                        user_id,
                        CreditScope::Organization,
                        CreditOperation::Remove,
                    ),
                })
            }
        };

        Self {
            user_id,
            unspent_credits,
            available_label,
            add_credits,
            remove_credits,
            organization_credits,
        }
    }

    /// Every form currently rendered, in display order
    pub fn forms(&self) -> Vec<&CreditsForm> {
        let mut forms = vec![&self.add_credits];
        forms.extend(self.remove_credits.as_ref());
        if let Some(section) = &self.organization_credits {
            forms.push(&section.add);
            forms.push(&section.remove);
        }
        forms
    }

    pub fn has_form(&self, id: &str) -> bool {
        self.forms().iter().any(|form| form.id == id)
    }
}
