#[cfg(test)]
pub mod support;

#[cfg(test)]
mod postgres;
#[cfg(test)]
mod uploads;
