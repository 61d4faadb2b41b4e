//! Concrete selectors for the booking site.
//!
//! Every [`Locator`] and [`Signal`] resolves to an ordered list of
//! alternatives; the first alternative that matches an element wins. Keep all
//! site-specific markup here so a layout change touches one file.

use crate::core::capabilities::{Locator, Signal};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Css(String),
    XPath(String),
}

fn css(s: &str) -> Selector {
    Selector::Css(s.to_string())
}

fn xpath(s: impl Into<String>) -> Selector {
    Selector::XPath(s.into())
}

/// Quote `text` as an XPath string literal, including text with both quote
/// kinds.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|p| format!("'{}'", p))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// `(//app-passenger)[n]`: the passenger block for zero-based `index`.
fn passenger_block(index: usize) -> String {
    format!("(//app-passenger)[{}]", index + 1)
}

fn train_card(train: &str) -> String {
    format!(
        "//app-train-avl-enq[.//strong[contains(text(), {})]]",
        xpath_literal(&format!("({})", train))
    )
}

pub fn locate(locator: &Locator) -> Vec<Selector> {
    match locator {
        Locator::LoginButton => vec![css("a.loginText.search_btn"), css("a[aria-label='login']")],
        Locator::UsernameInput => vec![css("input[formcontrolname='userid']")],
        Locator::PasswordInput => vec![css("input[formcontrolname='password']")],
        Locator::CaptchaImage => vec![css("app-login img.captcha-img"), css("img.captcha-img")],
        Locator::CaptchaInput => vec![
            css("app-login input[formcontrolname='captcha']"),
            css("input[formcontrolname='captcha']"),
            css("input[formcontrolname='nlpAnswer']"),
        ],
        Locator::CaptchaRefresh => vec![
            css("app-login a .glyphicon-repeat"),
            css("a .glyphicon-repeat"),
        ],
        Locator::SignInButton => vec![
            css("app-login button.search_btn.train_Search"),
            css("app-login button[type='submit']"),
        ],
        Locator::OriginInput => vec![
            css("p-autocomplete[formcontrolname='origin'] input"),
            css("p-autocomplete[formcontrolname='jps-origin'] input"),
        ],
        Locator::DestinationInput => vec![
            css("p-autocomplete[formcontrolname='destination'] input"),
            css("p-autocomplete[formcontrolname='jps-destination'] input"),
        ],
        Locator::StationOption(code) => vec![
            xpath(format!(
                "//li[contains(@class, 'ui-autocomplete-list-item')]//span[contains(text(), {})]",
                xpath_literal(code)
            )),
            xpath(format!(
                "//li[@role='option'][contains(., {})]",
                xpath_literal(code)
            )),
        ],
        Locator::JourneyDateInput => vec![
            css("p-calendar[formcontrolname='journeyDate'] input"),
            css("input[formcontrolname='journeyDate']"),
            css("p-calendar[formcontrolname='jps-journey-date'] input"),
        ],
        Locator::ClassDropdown => vec![css("p-dropdown[formcontrolname='journeyClass']")],
        Locator::ClassOption(code) => vec![xpath(format!(
            "//p-dropdownitem/li/span[contains(., {})]",
            xpath_literal(&format!("({})", code))
        ))],
        Locator::QuotaDropdown => vec![css("p-dropdown[formcontrolname='journeyQuota']")],
        Locator::QuotaOption(quota) => vec![xpath(format!(
            "//p-dropdownitem/li/span[normalize-space(text())={}]",
            xpath_literal(quota)
        ))],
        Locator::FindTrainsButton => vec![
            css("button.search_btn.train_Search[label='Find Trains']"),
            css("button.train_Search[label='Find Trains']"),
        ],
        Locator::TrainClass { train, class } => vec![
            xpath(format!(
                "{}//div[contains(@class, 'pre-avl')][.//strong[contains(text(), {})]]",
                train_card(train),
                xpath_literal(class)
            )),
            xpath(format!(
                "{}//td[contains(@class, {})]",
                train_card(train),
                xpath_literal(class)
            )),
        ],
        Locator::BookNow { train } => vec![xpath(format!(
            "{}//button[contains(., 'Book Now')]",
            train_card(train)
        ))],
        Locator::MobileInput => vec![css("input[formcontrolname='mobileNumber']")],
        Locator::PassengerName(i) => vec![
            xpath(format!("{}//input[@placeholder='Name']", passenger_block(*i))),
            xpath(format!(
                "{}//p-autocomplete[@formcontrolname='passengerName']//input",
                passenger_block(*i)
            )),
        ],
        Locator::PassengerAge(i) => vec![
            xpath(format!("{}//input[@formcontrolname='passengerAge']", passenger_block(*i))),
            xpath(format!("{}//input[@placeholder='Age']", passenger_block(*i))),
        ],
        Locator::PassengerGender(i) => vec![xpath(format!(
            "{}//select[@formcontrolname='passengerGender']",
            passenger_block(*i)
        ))],
        Locator::PassengerBerth(i) => vec![xpath(format!(
            "{}//select[@formcontrolname='passengerBerthChoice']",
            passenger_block(*i)
        ))],
        Locator::AddPassenger => vec![
            xpath("//span[contains(@class, 'prenext')][contains(., 'Add Passenger')]"),
            css("span.prenext"),
        ],
        Locator::AutoUpgradeCheckbox => vec![css("#autoUpgradation")],
        Locator::AutoUpgradeLabel => vec![css("label[for='autoUpgradation']")],
        Locator::ContinueButton => vec![
            css("button.train_Search.continue-booking-btn"),
            xpath("//app-passenger-input//button[contains(., 'Continue')]"),
        ],
        Locator::ReviewCaptchaImage => vec![
            css("app-review-booking img.captcha-img"),
            css("img.captcha-img"),
        ],
        Locator::ReviewCaptchaInput => vec![
            css("app-review-booking input[formcontrolname='captcha']"),
            css("app-review-booking input[formcontrolname='nlpAnswer']"),
        ],
        Locator::ReviewCaptchaRefresh => vec![
            css("app-review-booking a .glyphicon-repeat"),
            css("a .glyphicon-repeat"),
        ],
        Locator::ProceedToPay => vec![
            css("button.train_Search.payment-button"),
            xpath("//app-review-booking//button[contains(., 'Continue')]"),
        ],
        Locator::PaymentMethod(label) => vec![
            xpath(format!(
                "//div[contains(text(), {})]/ancestor::div[1]/preceding-sibling::div/p-radiobutton",
                xpath_literal(label)
            )),
            xpath(format!(
                "//div[contains(@class, 'bank-type')][contains(., {})]",
                xpath_literal(label)
            )),
        ],
        Locator::PayAndBook => vec![
            xpath("//button[contains(., 'Pay & Book')]"),
            css("button.btn.btn-primary.btn-lg"),
        ],
        Locator::AdvisoryClose => vec![
            css("p-dialog .p-dialog-header-close"),
            css("button.p-dialog-header-icon"),
        ],
        Locator::SessionTimeoutOk => vec![
            xpath("//div[contains(@class, 'p-dialog')][.//*[contains(., 'session')]]//button[normalize-space(.)='OK']"),
            css("button.p-confirm-dialog-accept"),
        ],
        Locator::ConfirmDialogAccept => vec![css("button.p-confirm-dialog-accept")],
    }
}

/// Selectors whose visible presence means `signal` is showing.
pub fn signal_selectors(signal: Signal) -> Vec<Selector> {
    match signal {
        Signal::BookingConfirmed => vec![
            xpath("//*[contains(text(), 'Booking Confirmed')]"),
            xpath("//app-booking-confirm//*[contains(text(), 'PNR')]"),
        ],
        Signal::PaymentPending => vec![
            xpath("//*[contains(text(), 'approve the payment')]"),
            xpath("//*[contains(text(), 'Payment is pending')]"),
        ],
        Signal::PaymentOptions => vec![
            css("app-payment-options"),
            xpath("//div[contains(text(), 'BHIM/ UPI')]"),
        ],
        Signal::ReviewPage => vec![css("app-review-booking")],
        Signal::PassengerForm => vec![css("app-passenger-input"), css("app-passenger")],
        Signal::TrainList => vec![css("app-train-avl-enq")],
        Signal::LoginForm => vec![
            css("app-login input[formcontrolname='userid']"),
            css("input[formcontrolname='userid']"),
        ],
        Signal::Dashboard => vec![xpath(
            "//app-jp-input[//a[contains(@class, 'search_btn')][contains(., 'LOGOUT')]]",
        )],
        Signal::LoggedOut => vec![
            xpath("//a[contains(@class, 'loginText')][contains(., 'LOGIN')]"),
            css("a[aria-label='login']"),
        ],
        Signal::AdvisoryDialog => vec![css("p-dialog .p-dialog-header-close")],
        Signal::SessionTimeoutDialog => vec![xpath(
            "//div[contains(@class, 'p-confirm-dialog-message')][contains(., 'session')]",
        )],
        Signal::ConfirmDialog => vec![css("div.p-confirm-dialog-message")],
    }
}
