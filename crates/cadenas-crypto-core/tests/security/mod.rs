mod entropy_quality;
mod uniform_failure;
