mod cancel;
mod run;
