use serde_json::{Number, Value};
use std::fmt::{Arguments, Result, Write};

/// Wraps some underlying buffer by providing methods that write to it
/// in different formats.
pub struct Pipe<'buffer> {
    buffer: &'buffer mut (dyn Write + 'buffer),
}

impl<'buffer> Pipe<'buffer> {
    /// Create a new Pipe that writes to the given buffer.
    pub fn new(buffer: &'buffer mut String) -> Self {
        Self { buffer }
    }

    /// Write the given Value to the Pipe buffer.
    ///
    /// The Pipe will handle formatting the value, and escape html
    /// characters when `escape` is true.
    ///
    /// # Errors
    ///
    /// The Pipe supports all Value types, so the only error that will
    /// be returned is propagated from the [write!] macro itself.
    pub fn write_value(&mut self, value: &Value, escape: bool) -> Result {
        match value {
            Value::Null => Ok(()),
            Value::Bool(bool) => write!(self.buffer, "{bool}"),
            Value::Number(number) => self.write_number(number),
            Value::String(string) => self.write_text(string, escape),
            Value::Array(array) => self.write_array(array, escape),
            Value::Object(_) => self.write_text("[object Object]", escape),
        }
    }

    /// Write the text, replacing `& < > " ' ` =` with entities when
    /// `escape` is true.
    pub fn write_text(&mut self, text: &str, escape: bool) -> Result {
        if !escape {
            return self.buffer.write_str(text);
        }

        let mut from = 0;
        for (index, char) in text.char_indices() {
            let entity = match char {
                '&' => "&amp;",
                '<' => "&lt;",
                '>' => "&gt;",
                '"' => "&quot;",
                '\'' => "&#x27;",
                '`' => "&#x60;",
                '=' => "&#x3D;",
                _ => continue,
            };
            self.buffer.write_str(&text[from..index])?;
            self.buffer.write_str(entity)?;
            from = index + 1;
        }

        self.buffer.write_str(&text[from..])
    }

    /// Write the number, dropping the fraction of whole floats so that
    /// `2.0` is written as `2`.
    fn write_number(&mut self, number: &Number) -> Result {
        match number.as_f64() {
            Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 => {
                write!(self.buffer, "{}", float as i64)
            }
            _ => write!(self.buffer, "{number}"),
        }
    }

    /// Write the items of the array separated by commas.
    fn write_array(&mut self, value: &[Value], escape: bool) -> Result {
        let mut iter = value.iter();
        if let Some(item) = iter.next() {
            self.write_value(item, escape)?;
            for item in iter {
                self.buffer.write_char(',')?;
                self.write_value(item, escape)?;
            }
        }

        Ok(())
    }
}

impl Write for Pipe<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result {
        Write::write_str(self.buffer, s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> Result {
        Write::write_char(self.buffer, c)
    }

    #[inline]
    fn write_fmt(&mut self, args: Arguments<'_>) -> Result {
        Write::write_fmt(self.buffer, args)
    }
}
