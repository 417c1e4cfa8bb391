//! Scripted Jira and my.atlassian.com pages on top of [`FakePage`].

use trialwatch::flows::atlassian::{self, EVALUATION_URL, generated_license};
use trialwatch::flows::jira::{self, application};
use trialwatch::page::Locator;

use crate::FakePage;

/// Render the license detail fields of `application_key`.
pub fn license_details(page: &FakePage, application_key: &str, fields: &[(&str, &str)]) {
    let app = application(application_key);
    page.show(app.clone());

    let field_locator = app.child(jira::selectors::LICENSE_DETAIL_FIELD);
    page.set_count(field_locator.clone(), fields.len());
    for (index, (name, value)) in fields.iter().enumerate() {
        let field = field_locator.nth(index);
        page.show_with_text(field.child(jira::selectors::LICENSE_DETAIL_NAME), name);
        let value_locator = field
            .child(jira::selectors::LICENSE_DETAIL_RAW)
            .or(&field.child(jira::selectors::LICENSE_DETAIL_VALUE));
        page.set_text(value_locator, value);
    }
}

/// Render the system info table with `server_id`.
pub fn server_id(page: &FakePage, server_id: &str) {
    page.show_with_text(jira::selectors::SERVER_ID_CELL, server_id);
}

/// Render the update-license link of `application_key`. Clicking it opens
/// the textarea, submitting hides it again.
pub fn license_update(page: &FakePage, application_key: &str) {
    let app = application(application_key);
    page.show(app.clone());

    let textarea = app.child(jira::selectors::UPDATE_LICENSE_TEXTAREA);
    let link = app.child(jira::selectors::UPDATE_LICENSE_LINK);
    page.show(link.clone());
    let opened = textarea.clone();
    page.on_click(link, move |page| page.show(opened.clone()));

    let submit = app.child(jira::selectors::UPDATE_LICENSE_SUBMIT);
    page.show(submit.clone());
    page.on_click(submit, move |page| page.hide(textarea.clone()));
}

/// The value pasted into the update textarea of `application_key`.
pub fn pasted_license(page: &FakePage, application_key: &str) -> Option<String> {
    page.value_of(application(application_key).child(jira::selectors::UPDATE_LICENSE_TEXTAREA))
}

pub fn jira_login_form() -> Locator {
    Locator::new(jira::selectors::LOGIN_FORM)
}

/// Render the Jira login form (hidden until [`FakePage::show`] is called on
/// [`jira_login_form`]). Submitting hides the form and, if `rejection` is
/// set, shows the error banner with that text.
pub fn jira_login(page: &FakePage, rejection: Option<&str>) {
    let form = jira_login_form();
    page.show(form.child(jira::selectors::LOGIN_PASSWORD));
    page.show(form.child(jira::selectors::LOGIN_USERNAME).first());
    page.attach(form.child(jira::selectors::LOGIN_REMEMBER_ME));

    let submit = form.child(jira::selectors::LOGIN_SUBMIT);
    page.show(submit.clone());

    let rejection = rejection.map(str::to_string);
    page.on_click(submit, move |page| {
        page.hide(jira_login_form());
        if let Some(text) = &rejection {
            page.show_with_text(jira::selectors::LOGIN_ERROR, text);
        }
    });
}

pub fn jira_sudo_form() -> Locator {
    Locator::new(jira::selectors::SUDO_FORM)
}

/// Render the websudo form fields; submitting hides the form.
pub fn jira_sudo(page: &FakePage) {
    let form = jira_sudo_form();
    page.show(form.child(jira::selectors::SUDO_PASSWORD));
    let submit = form.child(jira::selectors::SUDO_SUBMIT);
    page.show(submit.clone());
    page.on_click(submit, move |page| page.hide(jira_sudo_form()));
}

/// Script the evaluation page so generating a license for any server id
/// yields `license_key` in row `row_id`.
pub fn evaluation_page(page: &FakePage, row_id: &str, license_key: &str) {
    let row_id = row_id.to_string();
    let license_key = license_key.to_string();
    page.on_goto(EVALUATION_URL, |page| {
        page.show(atlassian::selectors::PRODUCT_SELECT);
        page.show(atlassian::selectors::DATA_CENTER_SELECT);
        page.show(atlassian::selectors::SERVER_ID_INPUT);
        page.show(atlassian::selectors::GENERATE);
    });
    page.on_click(atlassian::selectors::GENERATE, move |page| {
        page.set_value(generated_license(&row_id), &license_key);
        page.set_url(&format!("{EVALUATION_URL}#{row_id}"));
    });
}

/// The server id typed into the evaluation form.
pub fn submitted_server_id(page: &FakePage) -> Option<String> {
    page.value_of(atlassian::selectors::SERVER_ID_INPUT)
}
